//! API configuration and shared application state.

use std::env;
use std::sync::Arc;

use dialer_core::config::DialerConfig;
use dialer_core::dispatch::{ProviderDispatcher, TelephonyClient, VoiceAgentClient};
use dialer_core::error::DialerResult;
use dialer_core::ledger::CreditLedger;
use dialer_core::render::TemplateRenderer;
use dialer_core::scheduler::CampaignScheduler;
use dialer_core::storage::MemoryStorage;

/// Concrete storage backing the API process.
pub type Storage = MemoryStorage;

/// Concrete scheduler wired into the API process.
pub type Scheduler = CampaignScheduler<Storage, ProviderDispatcher, TemplateRenderer>;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 picks an ephemeral port).
    pub port: u16,
    /// Shared secret expected in the `x-cron-secret` header of trigger
    /// requests. An empty secret rejects all trigger requests.
    pub cron_secret: String,
    /// Enable permissive CORS (development only).
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cron_secret: String::new(),
            enable_cors: false,
        }
    }
}

impl ApiConfig {
    /// Load from environment variables.
    ///
    /// - DIALER_API_HOST
    /// - DIALER_API_PORT
    /// - DIALER_CRON_SECRET
    /// - DIALER_API_CORS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("DIALER_API_HOST").unwrap_or(defaults.host),
            port: env::var("DIALER_API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cron_secret: env::var("DIALER_CRON_SECRET").unwrap_or_default(),
            enable_cors: env::var("DIALER_API_CORS")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(false),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub ledger: CreditLedger<Storage>,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    /// Build the full engine stack from configuration.
    pub fn new(config: ApiConfig, dialer: DialerConfig) -> DialerResult<Self> {
        let storage = Arc::new(MemoryStorage::new());

        let dispatcher = Arc::new(ProviderDispatcher::new(
            TelephonyClient::new(dialer.telephony.clone())?,
            VoiceAgentClient::new(dialer.voice_agent.clone())?,
        ));

        let ledger = CreditLedger::new(storage.clone(), dialer.credits.clone());
        let scheduler = Arc::new(CampaignScheduler::new(
            storage.clone(),
            dispatcher,
            Arc::new(TemplateRenderer::default()),
            ledger.clone(),
            dialer.scheduler,
            dialer.credits,
        ));

        Ok(Self {
            storage,
            ledger,
            scheduler,
            config: Arc::new(config),
        })
    }
}
