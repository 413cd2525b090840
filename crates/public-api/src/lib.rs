//! Public API
//!
//! The lightweight, public-facing tier. It performs no proving work itself:
//! deposits and withdrawals are forwarded to the Relay Gateway over the
//! internal network, and the gateway's answer is returned unchanged.
//!
//! ## Endpoints
//!
//! - `GET /health` - Own liveness plus relay reachability
//! - `POST /api/deposit` - Forwarded to the gateway's `POST /deposit`
//! - `POST /api/withdraw` - Forwarded to the gateway's `POST /withdraw`

pub mod config;
pub mod forwarder;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use forwarder::{ForwardError, ForwardingClient, GatewayReply};

/// Application state shared across handlers
pub struct AppState {
    pub forwarder: ForwardingClient,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/deposit", post(handlers::deposit_handler))
        .route("/api/withdraw", post(handlers::withdraw_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
