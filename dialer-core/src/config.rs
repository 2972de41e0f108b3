//! Configuration for the dialer engine.
//!
//! Supports loading from environment variables with a DIALER_ prefix.

use serde::{Deserialize, Serialize};
use std::env;

/// Telephony provider configuration (platform-wide account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonyConfig {
    /// REST API base URL.
    pub base_url: String,
    /// Account SID.
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
    /// Default caller-id number (E.164). Owners may override per tenant.
    pub from_number: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.telephony.example.com/2010-04-01".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            timeout_secs: 30,
        }
    }
}

impl TelephonyConfig {
    /// Load from environment variables.
    ///
    /// - DIALER_TELEPHONY_BASE_URL
    /// - DIALER_TELEPHONY_ACCOUNT_SID
    /// - DIALER_TELEPHONY_AUTH_TOKEN
    /// - DIALER_TELEPHONY_FROM_NUMBER
    /// - DIALER_TELEPHONY_TIMEOUT
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("DIALER_TELEPHONY_BASE_URL").unwrap_or(defaults.base_url),
            account_sid: env::var("DIALER_TELEPHONY_ACCOUNT_SID").unwrap_or_default(),
            auth_token: env::var("DIALER_TELEPHONY_AUTH_TOKEN").unwrap_or_default(),
            from_number: env::var("DIALER_TELEPHONY_FROM_NUMBER").unwrap_or_default(),
            timeout_secs: env::var("DIALER_TELEPHONY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Voice-agent provider configuration (platform-wide endpoint; API keys are
/// per owner).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceAgentConfig {
    /// REST API base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for VoiceAgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.voiceagent.example.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl VoiceAgentConfig {
    /// Load from environment variables.
    ///
    /// - DIALER_VOICE_AGENT_BASE_URL
    /// - DIALER_VOICE_AGENT_TIMEOUT
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("DIALER_VOICE_AGENT_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: env::var("DIALER_VOICE_AGENT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Scheduler tick parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum enrollments processed per phase per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Dispatch attempt budget before an enrollment fails permanently.
    #[serde(default = "default_max_attempts")]
    pub max_dispatch_attempts: u32,
    /// Fixed delay before re-dispatch after a failed attempt, in seconds.
    #[serde(default = "default_dispatch_backoff")]
    pub dispatch_backoff_secs: u64,
    /// Delay between status polls for in-flight calls, in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Delay before retrying settlement billing, in seconds.
    #[serde(default = "default_billing_retry")]
    pub billing_retry_secs: u64,
    /// Delay before re-dispatch after an insufficient-credits outcome,
    /// in seconds. Does not consume an attempt.
    #[serde(default = "default_credits_delay")]
    pub insufficient_credits_delay_secs: u64,
    /// Consecutive status-fetch failures tolerated before an in-flight
    /// enrollment is failed permanently.
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,
    /// Maximum seconds an enrollment may stay in-flight after dispatch
    /// before it is failed permanently.
    #[serde(default = "default_max_calling")]
    pub max_calling_secs: u64,
    /// Callback URL for best-effort call recording. Recording is skipped
    /// when unset.
    #[serde(default)]
    pub recording_callback_url: Option<String>,
}

fn default_batch_size() -> usize {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_dispatch_backoff() -> u64 {
    900
}

fn default_poll_interval() -> u64 {
    60
}

fn default_billing_retry() -> u64 {
    600
}

fn default_credits_delay() -> u64 {
    3600
}

fn default_max_poll_failures() -> u32 {
    10
}

fn default_max_calling() -> u64 {
    1800
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 60,
            max_dispatch_attempts: 3,
            dispatch_backoff_secs: 900,
            poll_interval_secs: 60,
            billing_retry_secs: 600,
            insufficient_credits_delay_secs: 3600,
            max_poll_failures: 10,
            max_calling_secs: 1800,
            recording_callback_url: None,
        }
    }
}

impl SchedulerConfig {
    /// Load from environment variables.
    ///
    /// - DIALER_BATCH_SIZE
    /// - DIALER_MAX_DISPATCH_ATTEMPTS
    /// - DIALER_DISPATCH_BACKOFF_SECS
    /// - DIALER_POLL_INTERVAL_SECS
    /// - DIALER_BILLING_RETRY_SECS
    /// - DIALER_CREDITS_DELAY_SECS
    /// - DIALER_MAX_POLL_FAILURES
    /// - DIALER_MAX_CALLING_SECS
    /// - DIALER_RECORDING_CALLBACK_URL
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
            env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(fallback)
        }

        Self {
            batch_size: parsed("DIALER_BATCH_SIZE", 60),
            max_dispatch_attempts: parsed("DIALER_MAX_DISPATCH_ATTEMPTS", 3),
            dispatch_backoff_secs: parsed("DIALER_DISPATCH_BACKOFF_SECS", 900),
            poll_interval_secs: parsed("DIALER_POLL_INTERVAL_SECS", 60),
            billing_retry_secs: parsed("DIALER_BILLING_RETRY_SECS", 600),
            insufficient_credits_delay_secs: parsed("DIALER_CREDITS_DELAY_SECS", 3600),
            max_poll_failures: parsed("DIALER_MAX_POLL_FAILURES", 10),
            max_calling_secs: parsed("DIALER_MAX_CALLING_SECS", 1800),
            recording_callback_url: env::var("DIALER_RECORDING_CALLBACK_URL").ok(),
        }
    }
}

/// Credit pricing and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Fixed credit cost per dispatch attempt.
    #[serde(default = "default_dispatch_cost")]
    pub call_dispatch_cost: u64,
    /// Credits billed per call minute at settlement.
    #[serde(default = "default_per_minute_rate")]
    pub per_minute_rate: u64,
    /// Credits granted per auto-top-up package.
    #[serde(default = "default_package_credits")]
    pub top_up_package_credits: u64,
    /// Owner identities exempt from all consumption.
    #[serde(default)]
    pub free_owners: Vec<String>,
}

fn default_dispatch_cost() -> u64 {
    10
}

fn default_per_minute_rate() -> u64 {
    5
}

fn default_package_credits() -> u64 {
    100
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            call_dispatch_cost: 10,
            per_minute_rate: 5,
            top_up_package_credits: 100,
            free_owners: Vec::new(),
        }
    }
}

impl CreditsConfig {
    /// Load from environment variables.
    ///
    /// - DIALER_CALL_DISPATCH_COST
    /// - DIALER_PER_MINUTE_RATE
    /// - DIALER_TOP_UP_PACKAGE_CREDITS
    /// - DIALER_FREE_OWNERS (comma-separated owner ids)
    pub fn from_env() -> Self {
        Self {
            call_dispatch_cost: env::var("DIALER_CALL_DISPATCH_COST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            per_minute_rate: env::var("DIALER_PER_MINUTE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            top_up_package_credits: env::var("DIALER_TOP_UP_PACKAGE_CREDITS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            free_owners: env::var("DIALER_FREE_OWNERS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DialerConfig {
    /// Telephony provider account.
    pub telephony: TelephonyConfig,
    /// Voice-agent provider endpoint.
    pub voice_agent: VoiceAgentConfig,
    /// Scheduler tick parameters.
    pub scheduler: SchedulerConfig,
    /// Credit pricing and policy.
    pub credits: CreditsConfig,
}

impl DialerConfig {
    /// Load the full configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            telephony: TelephonyConfig::from_env(),
            voice_agent: VoiceAgentConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            credits: CreditsConfig::from_env(),
        }
    }

    /// Create a development configuration with short delays.
    pub fn development() -> Self {
        Self {
            telephony: TelephonyConfig {
                base_url: "http://127.0.0.1:4010".to_string(),
                account_sid: "ACdev".to_string(),
                auth_token: "devtoken".to_string(),
                from_number: "+15550000000".to_string(),
                timeout_secs: 5,
            },
            voice_agent: VoiceAgentConfig {
                base_url: "http://127.0.0.1:4011".to_string(),
                timeout_secs: 5,
            },
            scheduler: SchedulerConfig {
                batch_size: 10,
                max_dispatch_attempts: 3,
                dispatch_backoff_secs: 5,
                poll_interval_secs: 2,
                billing_retry_secs: 10,
                insufficient_credits_delay_secs: 30,
                max_poll_failures: 3,
                max_calling_secs: 120,
                recording_callback_url: None,
            },
            credits: CreditsConfig::default(),
        }
    }
}
