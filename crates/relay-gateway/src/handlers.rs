//! API handlers for the Relay Gateway

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use relay_common::{
    models::{
        DepositRequest, DepositResponse, ErrorResponse, HealthResponse, WithdrawRequest,
        WithdrawResponse, CORRELATION_HEADER,
    },
    ErrorCode, Job, JobParams, OperationKind, Outcome, TerminalState,
};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::ledger::{JobRecord, PendingEntry};
use crate::AppState;

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse::new(code, message),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ErrorCode::AuthenticationError, message)
    }

    /// Map a failed outcome to its status and classification.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        let message = outcome.message().unwrap_or_default();
        let error = match &outcome.state {
            TerminalState::Failed(failure) => {
                Self::new(StatusCode::BAD_GATEWAY, ErrorCode::ExecutionFailed, message)
                    .with_reason(failure.reason.as_str())
            }
            TerminalState::TimedOut { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, ErrorCode::Timeout, message)
            }
            TerminalState::Crashed { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::AbnormalTermination,
                message,
            ),
            TerminalState::Succeeded(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                "successful outcome mapped to an error",
            ),
        };
        error.with_correlation_id(outcome.correlation_id)
    }

    fn with_reason(mut self, reason: &str) -> Self {
        self.body = self.body.with_reason(reason);
        self
    }

    fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.body = self.body.with_correlation_id(correlation_id);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let correlation_id = self.body.correlation_id;
        let response = (self.status, Json(self.body)).into_response();

        match correlation_id {
            Some(id) => with_correlation_header(response, id),
            None => response,
        }
    }
}

impl From<relay_common::Error> for ApiError {
    fn from(err: relay_common::Error) -> Self {
        if err.is_validation() {
            ApiError::validation(err.to_string())
        } else {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalError,
                err.to_string(),
            )
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

fn with_correlation_header(mut response: Response, correlation_id: Uuid) -> Response {
    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Health check endpoint
///
/// Reads the operational identity's balance directly, without a job.
/// Returns 503 with `ok: false` when the backend cannot be queried.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let stats = state.supervisor.stats();
    let mut health = HealthResponse {
        ok: false,
        identity: String::new(),
        balance: 0,
        endpoint: state.settings.endpoint().to_string(),
        active_jobs: stats.active,
        max_concurrent_jobs: state.supervisor.max_concurrent(),
    };

    let identity = match state.settings.load_identity() {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Health check: identity unavailable: {:#}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, Json(health)).into_response();
        }
    };
    health.identity = identity.address.clone();

    match state.settings.backend(identity).balance().await {
        Ok(balance) => {
            health.ok = true;
            health.balance = balance;
            (StatusCode::OK, Json(health)).into_response()
        }
        Err(e) => {
            warn!("Health check: balance unavailable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(health)).into_response()
        }
    }
}

/// Validate, run, and record one job.
async fn run_job(state: &AppState, kind: OperationKind, params: JobParams) -> Result<Outcome, ApiError> {
    let job = Job::new(kind, params, Some(state.job_timeout))?;

    let entry = PendingEntry::open(Arc::clone(&state.ledger), &job).await;
    let outcome = state.supervisor.run(job).await;
    entry.resolve(&outcome).await;

    Ok(outcome)
}

/// Shield funds from the operational identity
pub async fn deposit_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DepositRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let outcome = run_job(&state, OperationKind::Deposit, request.into()).await?;
    let correlation_id = outcome.correlation_id;

    match outcome.state {
        TerminalState::Succeeded(result) => {
            let body = DepositResponse::from_result(correlation_id, result);
            Ok(with_correlation_header(Json(body).into_response(), correlation_id))
        }
        _ => Err(ApiError::from_outcome(&outcome)),
    }
}

/// Unshield funds to a recipient
pub async fn withdraw_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let requested_recipient = request.recipient.clone().unwrap_or_default();

    let outcome = run_job(&state, OperationKind::Withdraw, request.into()).await?;
    let correlation_id = outcome.correlation_id;

    match outcome.state {
        TerminalState::Succeeded(result) => {
            let body = WithdrawResponse::from_result(correlation_id, requested_recipient, result);
            Ok(with_correlation_header(Json(body).into_response(), correlation_id))
        }
        _ => Err(ApiError::from_outcome(&outcome)),
    }
}

/// Look up a recent job
pub async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
) -> Result<Json<JobRecord>, ApiError> {
    let correlation_id = Uuid::parse_str(&correlation_id)
        .map_err(|_| ApiError::validation(format!("Invalid correlation id: {}", correlation_id)))?;

    state.ledger.get(&correlation_id).await.map(Json).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorCode::NotFound,
            format!("No record of job {}", correlation_id),
        )
    })
}
