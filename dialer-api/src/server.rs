//! API server setup.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dialer_core::config::DialerConfig;

use crate::routes::create_router;
use crate::state::{ApiConfig, AppState};

/// Create the API server.
pub async fn create_server(
    config: ApiConfig,
    dialer: DialerConfig,
) -> Result<(Router, SocketAddr), Box<dyn std::error::Error + Send + Sync>> {
    let enable_cors = config.enable_cors;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let state = AppState::new(config, dialer)?;
    let mut router = create_router(state);

    router = router.layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    Ok((router, addr))
}

/// Run the API server.
pub async fn run_server(
    config: ApiConfig,
    dialer: DialerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (router, addr) = create_server(config, dialer).await?;

    tracing::info!("Dialer API server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Start the server in the background (for testing).
pub async fn start_background_server(
    config: ApiConfig,
    dialer: DialerConfig,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let (router, addr) = create_server(config, dialer).await?;

    // Bind to get the actual address (useful when port is 0)
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
