//! Native telephony REST client.
//!
//! Places inline speak-this-script calls, polls call resources for progress
//! and duration, and starts best-effort call recordings. Authenticated with
//! HTTP basic auth from the platform account SID and token.

use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CallStatusInfo, PlacedCall, ProviderCallStatus};
use crate::config::TelephonyConfig;
use crate::error::{DialerError, DialerResult};

/// Maximum provider error body length carried into error messages.
const MAX_BODY_SNIPPET: usize = 500;

/// Telephony REST client.
pub struct TelephonyClient {
    client: Client,
    config: TelephonyConfig,
}

/// Call resource as returned by the provider.
#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    status: String,
    /// Duration in seconds, returned as a string once the call has ended.
    duration: Option<String>,
}

impl TelephonyClient {
    /// Create a new client.
    pub fn new(config: TelephonyConfig) -> DialerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DialerError::Telephony(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn auth_header(&self) -> String {
        let auth = format!("{}:{}", self.config.account_sid, self.config.auth_token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(auth)
        )
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Calls.json",
            self.config.base_url, self.config.account_sid
        )
    }

    fn call_url(&self, call_sid: &str) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.config.base_url, self.config.account_sid, call_sid
        )
    }

    /// Place a call that speaks `script` to the callee.
    pub async fn place_script_call(
        &self,
        to: &str,
        from_override: Option<&str>,
        script: &str,
    ) -> DialerResult<PlacedCall> {
        let from = from_override.unwrap_or(&self.config.from_number);
        if from.is_empty() {
            return Err(DialerError::Configuration(
                "no outbound caller-id number configured".to_string(),
            ));
        }

        let document = speak_document(script);
        debug!(to, from, "placing telephony script call");

        let response = self
            .client
            .post(self.calls_url())
            .header("Authorization", self.auth_header())
            .form(&[("To", to), ("From", from), ("Twiml", document.as_str())])
            .send()
            .await?;

        let resource: CallResource = Self::parse_response(response).await?;
        Ok(PlacedCall {
            call_sid: resource.sid,
            conversation_id: None,
        })
    }

    /// Fetch call progress and duration.
    pub async fn fetch_call(&self, call_sid: &str) -> DialerResult<CallStatusInfo> {
        let response = self
            .client
            .get(self.call_url(call_sid))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        let resource: CallResource = Self::parse_response(response).await?;

        let status = ProviderCallStatus::parse(&resource.status).ok_or_else(|| {
            DialerError::Telephony(format!("unknown call status '{}'", resource.status))
        })?;
        let duration_secs = resource.duration.as_deref().and_then(|d| d.parse().ok());

        debug!(call_sid, %status, ?duration_secs, "fetched call status");
        Ok(CallStatusInfo {
            status,
            duration_secs,
        })
    }

    /// Start recording a live call, delivering the result to `callback_url`.
    pub async fn start_recording(&self, call_sid: &str, callback_url: &str) -> DialerResult<()> {
        let url = format!(
            "{}/Accounts/{}/Calls/{}/Recordings.json",
            self.config.base_url, self.config.account_sid, call_sid
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", self.auth_header())
            .form(&[("RecordingStatusCallback", callback_url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialerError::ProviderResponse {
                code: status.as_u16(),
                message: truncate_body(&body),
            });
        }
        Ok(())
    }

    async fn parse_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> DialerResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialerError::ProviderResponse {
                code: status.as_u16(),
                message: truncate_body(&body),
            });
        }
        response
            .json()
            .await
            .map_err(|e| DialerError::Telephony(e.to_string()))
    }
}

/// Build the speak-this-script call document, escaping XML-significant
/// characters in the script text.
fn speak_document(script: &str) -> String {
    let escaped = script
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!("<Response><Say>{escaped}</Say></Response>")
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_BODY_SNIPPET).collect()
}
