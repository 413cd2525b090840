//! Public API Service
//!
//! Lightweight public tier that forwards payment operations to the Relay Gateway.

use anyhow::{Context, Result};
use public_api::{create_router, AppState, Config, ForwardingClient};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "public_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Public API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded");
    info!("  Environment: {:?}", config.environment);
    info!("  API address: {}", config.api_address());
    info!("  Relay gateway: {}", config.relay_url);

    if config.relay_secret.is_none() {
        warn!("RELAY_SECRET is not set: forwarded requests carry no credential");
    }

    let forwarder = ForwardingClient::new(config.relay_url.clone(), config.relay_secret.clone());
    let app = create_router(AppState { forwarder });

    // Start server
    let listener = TcpListener::bind(&config.api_address())
        .await
        .with_context(|| format!("Failed to bind to {}", config.api_address()))?;

    info!("Public API listening on {}", config.api_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    Ok(())
}
