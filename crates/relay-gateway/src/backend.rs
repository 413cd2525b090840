//! Client for the external privacy-payment backend
//!
//! The backend performs the expensive proving work and submits the resulting
//! transaction. From the relay's point of view it is an opaque operation with
//! a cost profile and irreversible side effects.

use async_trait::async_trait;
use relay_common::{FailureReason, Job, OperationFailure, OperationResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::identity::OperationalIdentity;

/// Header carrying the job correlation id, so the backend can deduplicate
/// and a timed-out job can be looked up later.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unavailable(String),

    #[error("Backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

impl From<BackendError> for OperationFailure {
    fn from(err: BackendError) -> Self {
        let reason = match &err {
            BackendError::Unavailable(_) => FailureReason::BackendUnavailable,
            BackendError::Rejected { .. } => FailureReason::BackendRejected,
            BackendError::InsufficientBalance { .. } => FailureReason::InsufficientBalance,
            BackendError::MalformedResponse(_) => FailureReason::Internal,
        };
        OperationFailure::new(reason, err.to_string())
    }
}

/// Operations the relay performs against the backend.
///
/// A backend is built fresh inside each execution context and never shared
/// between jobs.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Shield `job.params.amount` from the operational identity.
    async fn deposit(&self, job: &Job) -> Result<OperationResult, BackendError>;

    /// Unshield to `job.params.recipient`.
    async fn withdraw(&self, job: &Job) -> Result<OperationResult, BackendError>;

    /// Available balance of the operational identity.
    async fn balance(&self) -> Result<u64, BackendError>;

    fn endpoint(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct OperationRequest<'a> {
    owner: &'a str,
    amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    #[serde(alias = "signature", alias = "tx")]
    reference: String,
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    partial: Option<bool>,
    #[serde(default)]
    fee: Option<u64>,
    #[serde(default)]
    commitment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(alias = "message")]
    error: String,
    #[serde(default)]
    needed: Option<u64>,
    #[serde(default)]
    available: Option<u64>,
}

/// HTTP backend client
pub struct HttpBackend {
    base_url: String,
    identity: OperationalIdentity,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, identity: OperationalIdentity) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
            client: reqwest::Client::new(),
        }
    }

    async fn submit(&self, path: &str, job: &Job) -> Result<OperationResult, BackendError> {
        let url = format!("{}/{}", self.base_url, path);
        let body = OperationRequest {
            owner: &self.identity.address,
            amount: job.params.amount,
            recipient: job.params.recipient.as_deref(),
            reference: job.params.reference.as_deref(),
        };

        debug!(correlation_id = %job.correlation_id, "Submitting to backend: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.identity.secret_key())
            .header(IDEMPOTENCY_HEADER, job.correlation_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let response = check_status(response, job.params.amount).await?;
        let parsed: OperationResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Ok(OperationResult {
            reference: parsed.reference,
            amount: parsed.amount.unwrap_or(job.params.amount),
            recipient: parsed.recipient.or_else(|| job.params.recipient.clone()),
            partial: parsed.partial,
            fee: parsed.fee,
            commitment: parsed.commitment,
            duration_ms: 0,
        })
    }
}

/// Classify a non-2xx backend response.
async fn check_status(
    response: reqwest::Response,
    needed: u64,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<BackendErrorBody>(&raw).ok();
    let message = body
        .as_ref()
        .map(|b| b.error.clone())
        .unwrap_or_else(|| raw.trim().to_string());

    if status == reqwest::StatusCode::PAYMENT_REQUIRED {
        return Err(BackendError::InsufficientBalance {
            needed: body.as_ref().and_then(|b| b.needed).unwrap_or(needed),
            available: body.as_ref().and_then(|b| b.available).unwrap_or(0),
        });
    }

    if status.is_server_error() {
        return Err(BackendError::Unavailable(format!("{}: {}", status, message)));
    }

    Err(BackendError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn deposit(&self, job: &Job) -> Result<OperationResult, BackendError> {
        self.submit("deposit", job).await
    }

    async fn withdraw(&self, job: &Job) -> Result<OperationResult, BackendError> {
        self.submit("withdraw", job).await
    }

    async fn balance(&self) -> Result<u64, BackendError> {
        let url = format!("{}/balance/{}", self.base_url, self.identity.address);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.identity.secret_key())
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let response = check_status(response, 0).await?;
        let parsed: BalanceResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Ok(parsed.balance)
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECIPIENT: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(format!("{}/", server.uri()), OperationalIdentity::development())
    }

    #[tokio::test]
    async fn test_deposit_sends_owner_and_idempotency_key() {
        let server = MockServer::start().await;
        let job = Job::deposit(5_000_000).unwrap();

        Mock::given(method("POST"))
            .and(path("/deposit"))
            .and(header(IDEMPOTENCY_HEADER, job.correlation_id.to_string().as_str()))
            .and(header("authorization", "Bearer development-only"))
            .and(body_partial_json(serde_json::json!({
                "owner": crate::identity::DEV_IDENTITY_ADDRESS,
                "amount": 5_000_000u64
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signature": "5xSig",
                "commitment": "abcd"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend(&server).deposit(&job).await.unwrap();
        assert_eq!(result.reference, "5xSig");
        assert_eq!(result.amount, 5_000_000);
        assert_eq!(result.commitment.as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_withdraw_echoes_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/withdraw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reference": "w1",
                "amount": 9_965_000u64,
                "fee": 35_000u64
            })))
            .mount(&server)
            .await;

        let job = Job::withdraw(10_000_000, RECIPIENT).unwrap();
        let result = backend(&server).withdraw(&job).await.unwrap();
        assert_eq!(result.recipient.as_deref(), Some(RECIPIENT));
        assert_eq!(result.fee, Some(35_000));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deposit"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "error": "insufficient funds",
                "available": 10u64
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/withdraw"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "proof verification failed"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let backend = backend(&server);

        let err = backend.deposit(&Job::deposit(500).unwrap()).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::InsufficientBalance { needed: 500, available: 10 }
        ));

        let job = Job::withdraw(500, RECIPIENT).unwrap();
        match backend.withdraw(&job).await.unwrap_err() {
            BackendError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "proof verification failed");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }

        assert!(matches!(
            backend.balance().await.unwrap_err(),
            BackendError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let backend = HttpBackend::new("http://127.0.0.1:1", OperationalIdentity::development());
        let err = backend.balance().await.unwrap_err();

        let failure = OperationFailure::from(err);
        assert_eq!(failure.reason, FailureReason::BackendUnavailable);
    }
}
