//! Mock backend for development and testing
//!
//! Simulates the privacy-payment backend without a network connection:
//! latency is slept, references and commitments are derived
//! deterministically, and withdrawals above the simulated shielded balance
//! are paid out partially.

use async_trait::async_trait;
use relay_common::{Job, OperationResult};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::backend::{Backend, BackendError};
use crate::identity::OperationalIdentity;

/// Public balance of the simulated identity, in the base unit.
pub const MOCK_BALANCE: u64 = 10_000_000_000;

/// Shielded balance available to withdraw from.
pub const MOCK_SHIELDED_BALANCE: u64 = 2_500_000_000;

/// Withdrawal fee in basis points (0.35 %).
pub const WITHDRAW_FEE_BPS: u64 = 35;

pub const MOCK_ENDPOINT: &str = "mock://backend";

/// Mock backend client
pub struct MockBackend {
    identity: OperationalIdentity,
    latency: Duration,
    balance: u64,
    shielded_balance: u64,
}

impl MockBackend {
    pub fn new(identity: OperationalIdentity, latency: Duration) -> Self {
        Self {
            identity,
            latency,
            balance: MOCK_BALANCE,
            shielded_balance: MOCK_SHIELDED_BALANCE,
        }
    }

    pub fn with_balances(mut self, balance: u64, shielded_balance: u64) -> Self {
        self.balance = balance;
        self.shielded_balance = shielded_balance;
        self
    }

    /// Deterministic digest over the job and identity
    fn digest(&self, label: &str, job: &Job) -> String {
        let mut hasher = Sha256::new();
        hasher.update(label.as_bytes());
        hasher.update(self.identity.address.as_bytes());
        hasher.update(job.correlation_id.as_bytes());
        hasher.update(job.params.amount.to_le_bytes());
        if let Some(recipient) = &job.params.recipient {
            hasher.update(recipient.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Fee charged on a withdrawal of `amount`, rounded down.
pub fn withdraw_fee(amount: u64) -> u64 {
    (amount as u128 * WITHDRAW_FEE_BPS as u128 / 10_000) as u64
}

#[async_trait]
impl Backend for MockBackend {
    async fn deposit(&self, job: &Job) -> Result<OperationResult, BackendError> {
        tokio::time::sleep(self.latency).await;

        let amount = job.params.amount;
        if amount > self.balance {
            return Err(BackendError::InsufficientBalance {
                needed: amount,
                available: self.balance,
            });
        }

        let reference = self.digest("deposit", job);
        debug!("Mock backend: deposit({}) -> {}", amount, &reference[..16]);

        Ok(OperationResult {
            reference,
            amount,
            recipient: job.params.recipient.clone(),
            partial: None,
            fee: None,
            commitment: Some(self.digest("commitment", job)),
            duration_ms: 0,
        })
    }

    async fn withdraw(&self, job: &Job) -> Result<OperationResult, BackendError> {
        tokio::time::sleep(self.latency).await;

        if self.shielded_balance == 0 {
            return Err(BackendError::InsufficientBalance {
                needed: job.params.amount,
                available: 0,
            });
        }

        let requested = job.params.amount;
        let partial = requested > self.shielded_balance;
        let gross = requested.min(self.shielded_balance);
        let fee = withdraw_fee(gross);

        let reference = self.digest("withdraw", job);
        debug!(
            "Mock backend: withdraw({}) -> {} (partial: {})",
            requested,
            &reference[..16],
            partial
        );

        Ok(OperationResult {
            reference,
            amount: gross - fee,
            recipient: job.params.recipient.clone(),
            partial: Some(partial),
            fee: Some(fee),
            commitment: None,
            duration_ms: 0,
        })
    }

    async fn balance(&self) -> Result<u64, BackendError> {
        Ok(self.balance)
    }

    fn endpoint(&self) -> &str {
        MOCK_ENDPOINT
    }
}
