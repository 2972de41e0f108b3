//! Dialer API server binary.

use tracing_subscriber::EnvFilter;

use dialer_api::{run_server, ApiConfig};
use dialer_core::config::DialerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dialer_core=info,dialer_api=info,tower_http=info")),
        )
        .init();

    let api_config = ApiConfig::from_env();
    let dialer_config = DialerConfig::from_env();

    run_server(api_config, dialer_config).await
}
