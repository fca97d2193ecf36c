//! BulletP Server Binary
//!
//! Standalone server for the BulletP outline API.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use bulletp_server::{serve, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = ServerConfig::load()?;
    if config.dev_routes_enabled() {
        tracing::warn!("development routes are enabled");
    }
    let state = Arc::new(AppState::from_config(&config)?);

    serve(&config.addr, state).await
}
