use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid deadline: {0}")]
    InvalidDeadline(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the error was caused by caller input rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_)
                | Error::InvalidRecipient(_)
                | Error::MissingField(_)
                | Error::InvalidDeadline(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Stable, caller-visible error classification.
///
/// The string form is part of the HTTP contract between the tiers and must
/// not change once released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    AuthenticationError,
    Timeout,
    ExecutionFailed,
    AbnormalTermination,
    TransportError,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::AuthenticationError => "authentication_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ExecutionFailed => "execution_failed",
            ErrorCode::AbnormalTermination => "abnormal_termination",
            ErrorCode::TransportError => "transport_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
