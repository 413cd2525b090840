//! API handlers for the Public API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use relay_common::{
    models::{DepositRequest, ErrorResponse, WithdrawRequest, CORRELATION_HEADER},
    ErrorCode,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::forwarder::{ForwardError, GatewayReply};
use crate::AppState;

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::new(ErrorCode::ValidationError, rejection.body_text()),
        }
    }
}

impl From<ForwardError> for ApiError {
    fn from(err: ForwardError) -> Self {
        ApiError {
            status: StatusCode::BAD_GATEWAY,
            body: ErrorResponse::new(err.code(), err.to_string()).with_reason(err.kind()),
        }
    }
}

/// Relay a gateway reply with its original status and body.
fn relay(reply: GatewayReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, Json(reply.body)).into_response();

    if let Some(id) = reply.correlation_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        response.headers_mut().insert(CORRELATION_HEADER, id);
    }
    response
}

#[derive(Debug, Serialize)]
pub struct RelayStatus {
    pub reachable: bool,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub relay: RelayStatus,
}

/// Health check endpoint
///
/// Always 200 while this process is alive; the relay's state is reported
/// alongside.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let relay = match state.forwarder.health().await {
        Ok(reply) => RelayStatus {
            reachable: true,
            ok: reply.is_success() && reply.body["ok"] == true,
            status: Some(reply.status),
            error: None,
        },
        Err(ForwardError::BadStatus { status, .. }) => RelayStatus {
            reachable: true,
            ok: false,
            status: Some(status),
            error: None,
        },
        Err(e) => {
            warn!("Relay gateway health check failed: {}", e);
            RelayStatus {
                reachable: false,
                ok: false,
                status: None,
                error: Some(e.to_string()),
            }
        }
    };

    Json(HealthResponse {
        status: "healthy",
        service: "public-api",
        relay,
    })
}

/// Forward a deposit to the relay gateway
pub async fn deposit_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    info!(amount = request.amount, "Forwarding deposit");

    let reply = state.forwarder.deposit(&request).await.map_err(|e| {
        warn!("Deposit forwarding failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(relay(reply))
}

/// Forward a withdrawal to the relay gateway
pub async fn withdraw_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    info!(amount = request.amount, "Forwarding withdrawal");

    let reply = state.forwarder.withdraw(&request).await.map_err(|e| {
        warn!("Withdraw forwarding failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(relay(reply))
}
