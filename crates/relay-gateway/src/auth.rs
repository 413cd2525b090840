//! Shared-secret authentication for state-changing routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_common::{models::AUTH_HEADER, Credential};
use std::sync::Arc;
use tracing::warn;

use crate::handlers::ApiError;
use crate::AppState;

/// How inbound requests are authenticated.
///
/// `Disabled` is a deliberate development-only state: it is selected only
/// when no secret is configured outside production, and every request it
/// lets through is logged.
#[derive(Debug, Clone)]
pub enum AuthMode {
    Required(Credential),
    Disabled,
}

impl AuthMode {
    pub fn is_required(&self) -> bool {
        matches!(self, AuthMode::Required(_))
    }
}

/// Reject requests whose `x-auth` header does not match the configured
/// secret. Runs before the body is read, so no job exists yet.
pub async fn require_credential(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match &state.auth {
        AuthMode::Required(credential) => {
            let presented = request
                .headers()
                .get(AUTH_HEADER)
                .and_then(|value| value.to_str().ok());

            match presented {
                Some(presented) if credential.matches(presented) => next.run(request).await,
                Some(_) => {
                    warn!(path = %request.uri().path(), "Rejected request with invalid credential");
                    ApiError::unauthorized("Invalid credential").into_response()
                }
                None => {
                    warn!(path = %request.uri().path(), "Rejected request without credential");
                    ApiError::unauthorized(format!("Missing {} header", AUTH_HEADER)).into_response()
                }
            }
        }
        AuthMode::Disabled => {
            warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Accepting unauthenticated request: RELAY_SECRET is not configured"
            );
            next.run(request).await
        }
    }
}
