//! Conversational voice-agent REST client.
//!
//! The voice-agent provider bridges a telephony number to a configured agent.
//! Placing a call requires resolving the agent's phone-number binding first;
//! the call then returns both the telephony call SID (for polling) and an
//! opaque conversation identifier. API keys are per owner and supplied per
//! request.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{CallContext, PlacedCall};
use crate::config::VoiceAgentConfig;
use crate::error::{DialerError, DialerResult};

/// Maximum provider error body length carried into error messages.
const MAX_BODY_SNIPPET: usize = 500;

/// Voice-agent REST client.
pub struct VoiceAgentClient {
    client: Client,
    config: VoiceAgentConfig,
}

/// A phone number bound to the account, possibly assigned to an agent.
#[derive(Debug, Deserialize)]
struct PhoneNumberBinding {
    phone_number_id: String,
    agent_id: Option<String>,
}

/// Response to an outbound-call request.
#[derive(Debug, Deserialize)]
struct OutboundCallResponse {
    call_sid: Option<String>,
    conversation_id: Option<String>,
    message: Option<String>,
}

impl VoiceAgentClient {
    /// Create a new client.
    pub fn new(config: VoiceAgentConfig) -> DialerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DialerError::VoiceAgent(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Resolve the phone-number binding for an agent.
    pub async fn resolve_agent_number(&self, api_key: &str, agent_id: &str) -> DialerResult<String> {
        let url = format!("{}/v1/phone-numbers", self.config.base_url);
        let response = self
            .client
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await?;

        let bindings: Vec<PhoneNumberBinding> = Self::parse_response(response).await?;
        bindings
            .into_iter()
            .find(|b| b.agent_id.as_deref() == Some(agent_id))
            .map(|b| b.phone_number_id)
            .ok_or_else(|| {
                DialerError::Configuration(format!(
                    "no phone number bound to voice agent {agent_id}"
                ))
            })
    }

    /// Place an outbound call bridging the agent's number to the callee.
    ///
    /// `script` overrides the agent's configured opening line; `context`
    /// carries contact and campaign variables into the conversation.
    pub async fn place_agent_call(
        &self,
        api_key: &str,
        agent_id: &str,
        to: &str,
        script: &str,
        context: &CallContext,
    ) -> DialerResult<PlacedCall> {
        let phone_number_id = self.resolve_agent_number(api_key, agent_id).await?;
        debug!(agent_id, phone_number_id, to, "placing voice-agent call");

        let body = json!({
            "agent_id": agent_id,
            "agent_phone_number_id": phone_number_id,
            "to_number": to,
            "conversation_initiation_client_data": {
                "dynamic_variables": {
                    "contact_name": context.contact_name,
                    "contact_email": context.contact_email,
                    "contact_phone": context.contact_phone,
                    "campaign_id": context.campaign_id.as_ref().map(|c| c.to_string()),
                },
                "conversation_config_override": {
                    "agent": {
                        "first_message": script,
                    }
                }
            }
        });

        let url = format!("{}/v1/agents/outbound-call", self.config.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let result: OutboundCallResponse = Self::parse_response(response).await?;
        let call_sid = result.call_sid.ok_or_else(|| {
            DialerError::VoiceAgent(format!(
                "provider accepted the call but returned no call sid: {}",
                result.message.unwrap_or_default()
            ))
        })?;

        Ok(PlacedCall {
            call_sid,
            conversation_id: result.conversation_id,
        })
    }

    async fn parse_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> DialerResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DialerError::ProviderResponse {
                code: status.as_u16(),
                message: body.chars().take(MAX_BODY_SNIPPET).collect(),
            });
        }
        response
            .json()
            .await
            .map_err(|e| DialerError::VoiceAgent(e.to_string()))
    }
}
