//! Call dispatch - abstraction over the two call-placement providers.
//!
//! Calls are placed either through the native telephony API (an inline
//! speak-this-script call) or through a third-party conversational
//! voice-agent API bridged through the same telephony account. Status polling
//! always goes to the telephony provider, because both paths route through
//! the same account.
//!
//! Provider side effects are not idempotent; callers never re-place a call
//! for an enrollment once it has left the queue.

pub mod telephony;
pub mod voiceagent;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DialerError, DialerResult};
use crate::types::{CampaignId, OwnerId};

pub use telephony::TelephonyClient;
pub use voiceagent::VoiceAgentClient;

/// Call progress as reported by the telephony provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

impl ProviderCallStatus {
    /// Whether the call has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Busy | Self::Failed | Self::NoAnswer | Self::Canceled
        )
    }

    /// Whether the call is still progressing.
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    /// Parse a provider status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" | "initiated" => Some(Self::Queued),
            "ringing" => Some(Self::Ringing),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "failed" => Some(Self::Failed),
            "no-answer" => Some(Self::NoAnswer),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Ringing => write!(f, "ringing"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Completed => write!(f, "completed"),
            Self::Busy => write!(f, "busy"),
            Self::Failed => write!(f, "failed"),
            Self::NoAnswer => write!(f, "no-answer"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// Which provider path a call attempt takes, resolved per attempt from the
/// campaign's agent reference and the owner's provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRoute {
    /// Native telephony path: inline speak-this-script call.
    Telephony,
    /// Voice-agent path: bridge the telephony number to an agent.
    VoiceAgent { agent_id: String, api_key: String },
}

/// Structured context passed to the voice-agent provider.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub campaign_id: Option<CampaignId>,
}

/// A single outbound call to place.
#[derive(Debug, Clone)]
pub struct OutboundCallRequest {
    /// Owning tenant.
    pub owner_id: OwnerId,
    /// Destination number (E.164).
    pub to: String,
    /// Caller-id override from the owner's provider settings.
    pub from_override: Option<String>,
    /// Rendered script: spoken directly on the native path, used as the
    /// agent's opening-line override on the voice-agent path.
    pub script: String,
    /// Resolved provider path.
    pub route: ProviderRoute,
    /// Structured context for the voice-agent path.
    pub context: CallContext,
}

/// Result of placing a call.
#[derive(Debug, Clone)]
pub struct PlacedCall {
    /// Telephony call handle, used for status polling on both paths.
    pub call_sid: String,
    /// Opaque conversation identifier (voice-agent path only).
    pub conversation_id: Option<String>,
}

/// Polled call progress.
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    pub status: ProviderCallStatus,
    /// Call duration in seconds, populated once the call has ended.
    pub duration_secs: Option<u64>,
}

/// Abstraction over call placement and polling.
#[async_trait]
pub trait CallDispatcher: Send + Sync {
    /// Place an outbound call.
    async fn place_call(&self, request: &OutboundCallRequest) -> DialerResult<PlacedCall>;

    /// Poll the telephony provider for call progress and duration.
    async fn fetch_status(&self, call_sid: &str) -> DialerResult<CallStatusInfo>;

    /// Start recording a live call. Best-effort; failures are logged by
    /// callers and never fatal to the call or billing flow.
    async fn start_recording(&self, call_sid: &str, callback_url: &str) -> DialerResult<()>;
}

/// Production dispatcher composing the two provider clients.
pub struct ProviderDispatcher {
    telephony: TelephonyClient,
    voice_agent: VoiceAgentClient,
}

impl ProviderDispatcher {
    pub fn new(telephony: TelephonyClient, voice_agent: VoiceAgentClient) -> Self {
        Self {
            telephony,
            voice_agent,
        }
    }
}

#[async_trait]
impl CallDispatcher for ProviderDispatcher {
    async fn place_call(&self, request: &OutboundCallRequest) -> DialerResult<PlacedCall> {
        match &request.route {
            ProviderRoute::Telephony => {
                self.telephony
                    .place_script_call(&request.to, request.from_override.as_deref(), &request.script)
                    .await
            }
            ProviderRoute::VoiceAgent { agent_id, api_key } => {
                if api_key.is_empty() {
                    return Err(DialerError::Configuration(
                        "voice-agent API key is empty".to_string(),
                    ));
                }
                self.voice_agent
                    .place_agent_call(api_key, agent_id, &request.to, &request.script, &request.context)
                    .await
            }
        }
    }

    async fn fetch_status(&self, call_sid: &str) -> DialerResult<CallStatusInfo> {
        self.telephony.fetch_call(call_sid).await
    }

    async fn start_recording(&self, call_sid: &str, callback_url: &str) -> DialerResult<()> {
        self.telephony.start_recording(call_sid, callback_url).await
    }
}
