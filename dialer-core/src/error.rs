//! Error types for the campaign scheduler and credit ledger.

use thiserror::Error;

use crate::types::enrollment::EnrollmentTransitionError;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum DialerError {
    /// Configuration error (missing credentials, agent binding, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Enrollment already exists for this campaign/contact pair
    #[error("Enrollment already exists for campaign {campaign_id} contact {contact_id}")]
    EnrollmentExists {
        campaign_id: String,
        contact_id: String,
    },

    /// Invalid caller-supplied input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid enrollment state transition
    #[error("State transition error: {0}")]
    StateTransition(#[from] EnrollmentTransitionError),

    /// Balance too low for a required debit
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: u64, available: u64 },

    /// Telephony provider request failed
    #[error("Telephony provider error: {0}")]
    Telephony(String),

    /// Voice-agent provider request failed
    #[error("Voice-agent provider error: {0}")]
    VoiceAgent(String),

    /// Provider returned a non-success HTTP response
    #[error("Provider response error: HTTP {code} - {message}")]
    ProviderResponse { code: u16, message: String },

    /// Payment provider unreachable or misconfigured
    #[error("Top-up unavailable: {0}")]
    TopUpUnavailable(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide result type.
pub type DialerResult<T> = Result<T, DialerError>;

impl From<reqwest::Error> for DialerError {
    fn from(e: reqwest::Error) -> Self {
        DialerError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for DialerError {
    fn from(e: serde_json::Error) -> Self {
        DialerError::Serialization(e.to_string())
    }
}
