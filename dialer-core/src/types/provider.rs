//! Per-owner provider settings.
//!
//! These used to live in process-global credential maps in an earlier design;
//! they are stored per owner and resolved through a per-tick cache so a
//! long-lived process never serves stale credentials.

use serde::{Deserialize, Serialize};

/// Provider configuration owned by a single tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Voice-agent provider API key. Required for the voice-agent call path.
    pub voice_agent_api_key: Option<String>,

    /// Caller-id number for outbound calls, overriding the platform default.
    pub outbound_number: Option<String>,
}

impl ProviderSettings {
    /// Whether the voice-agent path is configured for this owner.
    pub fn has_voice_agent(&self) -> bool {
        self.voice_agent_api_key.is_some()
    }
}
