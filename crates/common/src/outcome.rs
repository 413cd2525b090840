//! Results produced by execution contexts and resolved by the supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorCode;

/// Result payload of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// External transaction reference
    pub reference: String,

    /// Amount actually moved, in the base unit
    pub amount: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Withdrawal settled for less than requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,

    /// Hex-encoded commitment derived by the operation, when it produces one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<String>,

    /// Wall-clock time spent in the external operation
    #[serde(default)]
    pub duration_ms: u64,
}

/// Why an operation reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    BackendRejected,
    BackendUnavailable,
    InsufficientBalance,
    IdentityUnavailable,
    InvalidJob,
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::BackendRejected => "backend_rejected",
            FailureReason::BackendUnavailable => "backend_unavailable",
            FailureReason::InsufficientBalance => "insufficient_balance",
            FailureReason::IdentityUnavailable => "identity_unavailable",
            FailureReason::InvalidJob => "invalid_job",
            FailureReason::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the operation itself, with upstream detail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}: {detail}")]
pub struct OperationFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl OperationFailure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// The single terminal message an execution context sends to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionReport {
    Success { result: OperationResult },
    Failure { reason: FailureReason, detail: String },
}

impl From<Result<OperationResult, OperationFailure>> for ExecutionReport {
    fn from(result: Result<OperationResult, OperationFailure>) -> Self {
        match result {
            Ok(result) => ExecutionReport::Success { result },
            Err(OperationFailure { reason, detail }) => ExecutionReport::Failure { reason, detail },
        }
    }
}

/// Terminal state of a job. Exactly one is reached per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalState {
    Succeeded(OperationResult),
    /// The operation reported an error
    Failed(OperationFailure),
    /// The deadline elapsed first; the external effect is unknown
    TimedOut { deadline: Duration },
    /// The context died without reporting
    Crashed { detail: String },
}

impl TerminalState {
    pub fn name(&self) -> &'static str {
        match self {
            TerminalState::Succeeded(_) => "succeeded",
            TerminalState::Failed(_) => "failed",
            TerminalState::TimedOut { .. } => "timed_out",
            TerminalState::Crashed { .. } => "crashed",
        }
    }

    /// Caller-visible classification, `None` on success.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            TerminalState::Succeeded(_) => None,
            TerminalState::Failed(_) => Some(ErrorCode::ExecutionFailed),
            TerminalState::TimedOut { .. } => Some(ErrorCode::Timeout),
            TerminalState::Crashed { .. } => Some(ErrorCode::AbnormalTermination),
        }
    }
}

impl From<ExecutionReport> for TerminalState {
    fn from(report: ExecutionReport) -> Self {
        match report {
            ExecutionReport::Success { result } => TerminalState::Succeeded(result),
            ExecutionReport::Failure { reason, detail } => {
                TerminalState::Failed(OperationFailure { reason, detail })
            }
        }
    }
}

/// Resolution of one job, delivered to the caller exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub correlation_id: Uuid,
    pub elapsed: Duration,
    pub state: TerminalState,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self.state, TerminalState::Succeeded(_))
    }

    pub fn result(&self) -> Option<&OperationResult> {
        match &self.state {
            TerminalState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.state.error_code()
    }

    /// Human-readable failure message, `None` on success.
    pub fn message(&self) -> Option<String> {
        match &self.state {
            TerminalState::Succeeded(_) => None,
            TerminalState::Failed(failure) => Some(format!("Operation failed: {}", failure)),
            TerminalState::TimedOut { deadline } => Some(format!(
                "Operation timed out after {} ms; the external operation may still have been submitted",
                deadline.as_millis()
            )),
            TerminalState::Crashed { detail } => {
                Some(format!("Execution context terminated abnormally: {}", detail))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> OperationResult {
        OperationResult {
            reference: "5xTx".to_string(),
            amount: 5_000_000,
            recipient: None,
            partial: None,
            fee: None,
            commitment: None,
            duration_ms: 12,
        }
    }

    #[test]
    fn test_report_wire_format() {
        let report = ExecutionReport::Success {
            result: sample_result(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["result"]["amount"], 5_000_000);
        assert!(json["result"].get("fee").is_none());

        let failure: ExecutionReport = serde_json::from_str(
            r#"{"status":"failure","reason":"backend_rejected","detail":"nonce too low"}"#,
        )
        .unwrap();
        assert_eq!(
            failure,
            ExecutionReport::Failure {
                reason: FailureReason::BackendRejected,
                detail: "nonce too low".to_string()
            }
        );
    }

    #[test]
    fn test_terminal_states_have_distinct_codes() {
        let failed = TerminalState::Failed(OperationFailure::new(FailureReason::Internal, "x"));
        let timed_out = TerminalState::TimedOut {
            deadline: Duration::from_millis(1),
        };
        let crashed = TerminalState::Crashed {
            detail: "exit code 3".to_string(),
        };

        assert_eq!(failed.error_code(), Some(ErrorCode::ExecutionFailed));
        assert_eq!(timed_out.error_code(), Some(ErrorCode::Timeout));
        assert_eq!(crashed.error_code(), Some(ErrorCode::AbnormalTermination));
        assert_eq!(TerminalState::Succeeded(sample_result()).error_code(), None);
    }

    #[test]
    fn test_timeout_message_mentions_possible_submission() {
        let outcome = Outcome {
            correlation_id: Uuid::new_v4(),
            elapsed: Duration::from_millis(5),
            state: TerminalState::TimedOut {
                deadline: Duration::from_millis(5),
            },
        };
        let message = outcome.message().unwrap();
        assert!(message.contains("timed out"));
        assert!(message.contains("may still have been submitted"));
        assert!(!outcome.is_success());
    }
}
