//! Relay Gateway
//!
//! Authenticated HTTP front for the job supervisor. Each accepted deposit or
//! withdrawal becomes one job, executed in its own isolated context under a
//! deadline, and its outcome is mapped to a classified HTTP response.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness plus operational identity balance (no auth)
//! - `POST /deposit` - Shield funds (`x-auth` required when a secret is set)
//! - `POST /withdraw` - Unshield to a recipient
//! - `GET /jobs/{correlation_id}` - What the relay knows about a recent job

pub mod auth;
pub mod backend;
pub mod config;
pub mod handlers;
pub mod identity;
pub mod ledger;
pub mod mock_backend;
pub mod operation;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use job_supervisor::Supervisor;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use auth::AuthMode;
pub use backend::{Backend, BackendError, HttpBackend};
pub use config::{Config, ExecutionMode};
pub use relay_common::Environment;
pub use identity::OperationalIdentity;
pub use ledger::{ExternalState, JobLedger, JobRecord};
pub use mock_backend::MockBackend;
pub use operation::{BackendOperation, ContextSettings};

/// Application state shared across handlers
pub struct AppState {
    pub supervisor: Supervisor,
    pub auth: AuthMode,
    pub ledger: Arc<JobLedger>,

    /// Used for the health check, and handed to task-mode contexts
    pub settings: ContextSettings,

    /// Deadline applied to every job
    pub job_timeout: Duration,
}

impl AppState {
    pub fn new(
        supervisor: Supervisor,
        auth: AuthMode,
        settings: ContextSettings,
        job_timeout: Duration,
    ) -> Self {
        Self {
            supervisor,
            auth,
            ledger: Arc::new(JobLedger::default()),
            settings,
            job_timeout,
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    let protected = Router::new()
        .route("/deposit", post(handlers::deposit_handler))
        .route("/withdraw", post(handlers::withdraw_handler))
        .route("/jobs/{correlation_id}", get(handlers::job_status_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&shared_state),
            auth::require_credential,
        ));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(protected)
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
