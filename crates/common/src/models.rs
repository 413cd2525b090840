//! HTTP wire models shared by the relay gateway and the public tier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::job::JobParams;
use crate::outcome::OperationResult;

/// Header carrying the shared credential.
pub const AUTH_HEADER: &str = "x-auth";

/// Header carrying the job correlation id on relay responses.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// `POST /deposit` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    /// Amount in the base unit
    pub amount: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// `POST /withdraw` body
///
/// `recipient` is optional on the wire so a missing value is reported as a
/// validation error rather than a decode error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub amount: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl From<DepositRequest> for JobParams {
    fn from(req: DepositRequest) -> Self {
        JobParams {
            amount: req.amount,
            recipient: req.recipient,
            reference: req.reference,
        }
    }
}

impl From<WithdrawRequest> for JobParams {
    fn from(req: WithdrawRequest) -> Self {
        JobParams {
            amount: req.amount,
            recipient: req.recipient,
            reference: req.reference,
        }
    }
}

/// Successful deposit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositResponse {
    pub success: bool,
    pub reference: String,
    pub amount: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<String>,

    pub correlation_id: Uuid,
}

impl DepositResponse {
    pub fn from_result(correlation_id: Uuid, result: OperationResult) -> Self {
        Self {
            success: true,
            reference: result.reference,
            amount: result.amount,
            commitment: result.commitment,
            correlation_id,
        }
    }
}

/// Successful withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub success: bool,
    pub reference: String,
    pub recipient: String,
    pub amount: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,

    pub correlation_id: Uuid,
}

impl WithdrawResponse {
    /// `requested_recipient` is used when the backend did not echo one.
    pub fn from_result(
        correlation_id: Uuid,
        requested_recipient: String,
        result: OperationResult,
    ) -> Self {
        Self {
            success: true,
            reference: result.reference,
            recipient: result.recipient.unwrap_or(requested_recipient),
            amount: result.amount,
            partial: result.partial,
            fee: result.fee,
            correlation_id,
        }
    }
}

/// `GET /health` on the relay gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,

    /// Public address of the operational identity
    pub identity: String,

    /// Available balance of the operational identity, in the base unit
    pub balance: u64,

    /// Backend endpoint the gateway operates against
    pub endpoint: String,

    #[serde(default)]
    pub active_jobs: usize,

    #[serde(default)]
    pub max_concurrent_jobs: usize,
}

/// Error body returned by both tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,

    /// Finer-grained cause within `code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            reason: None,
            correlation_id: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_response_falls_back_to_requested_recipient() {
        let result = OperationResult {
            reference: "sig".to_string(),
            amount: 9_965_000,
            recipient: None,
            partial: Some(false),
            fee: Some(35_000),
            commitment: None,
            duration_ms: 3,
        };
        let id = Uuid::new_v4();
        let response = WithdrawResponse::from_result(id, "Recipient111".to_string(), result);
        assert_eq!(response.recipient, "Recipient111");
        assert_eq!(response.fee, Some(35_000));
        assert!(response.success);
    }

    #[test]
    fn test_error_response_omits_empty_fields() {
        let body = ErrorResponse::new(ErrorCode::ValidationError, "bad amount");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "validation_error");
        assert!(json.get("reason").is_none());
        assert!(json.get("correlation_id").is_none());
    }

    #[test]
    fn test_negative_amount_fails_to_decode() {
        let result: Result<DepositRequest, _> = serde_json::from_str(r#"{"amount": -5}"#);
        assert!(result.is_err());
        let result: Result<DepositRequest, _> = serde_json::from_str(r#"{"amount": 1.5}"#);
        assert!(result.is_err());
    }
}
