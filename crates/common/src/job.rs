//! The unit of work owned by the job supervisor.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::validation::{validate_amount, validate_recipient};

/// Deadline applied when the caller does not supply one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// Upper bound on any deadline, so a job cannot pin an execution context
/// indefinitely.
pub const MAX_DEADLINE: Duration = Duration::from_secs(600);

/// Kind of privacy-preserving payment operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Deposit,
    Withdraw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque operation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParams {
    /// Amount in the base unit
    pub amount: u64,

    /// Destination account (required for withdrawals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Caller-side reference id (e.g. a payment link)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl JobParams {
    /// Check the parameters for the given operation kind.
    pub fn validate(&self, kind: OperationKind) -> Result<()> {
        validate_amount(self.amount)?;

        match (kind, self.recipient.as_deref()) {
            (OperationKind::Withdraw, None) => Err(Error::MissingField("recipient")),
            (_, Some(recipient)) => validate_recipient(recipient).map(|_| ()),
            (OperationKind::Deposit, None) => Ok(()),
        }
    }
}

/// One logical request for an isolated unit of work.
///
/// Jobs are plain data: everything an execution context needs is copied into
/// the job, so it can be serialized across a process boundary unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub correlation_id: Uuid,
    pub kind: OperationKind,
    pub params: JobParams,
    #[serde(with = "duration_millis")]
    pub deadline: Duration,
}

impl Job {
    /// Create a validated job with a fresh correlation id.
    pub fn new(
        kind: OperationKind,
        params: JobParams,
        requested_deadline: Option<Duration>,
    ) -> Result<Self> {
        params.validate(kind)?;
        let deadline = resolve_deadline(requested_deadline)?;

        Ok(Self {
            correlation_id: Uuid::new_v4(),
            kind,
            params,
            deadline,
        })
    }

    pub fn deposit(amount: u64) -> Result<Self> {
        Self::new(
            OperationKind::Deposit,
            JobParams {
                amount,
                recipient: None,
                reference: None,
            },
            None,
        )
    }

    pub fn withdraw(amount: u64, recipient: impl Into<String>) -> Result<Self> {
        Self::new(
            OperationKind::Withdraw,
            JobParams {
                amount,
                recipient: Some(recipient.into()),
                reference: None,
            },
            None,
        )
    }

    /// Replace the deadline, applying the same rules as [`Job::new`].
    pub fn with_deadline(mut self, deadline: Duration) -> Result<Self> {
        self.deadline = resolve_deadline(Some(deadline))?;
        Ok(self)
    }
}

/// Apply the default and clamp to [`MAX_DEADLINE`].
pub fn resolve_deadline(requested: Option<Duration>) -> Result<Duration> {
    match requested {
        None => Ok(DEFAULT_DEADLINE),
        Some(d) if d.is_zero() => Err(Error::InvalidDeadline(
            "deadline must be greater than zero".to_string(),
        )),
        Some(d) => Ok(d.min(MAX_DEADLINE)),
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
