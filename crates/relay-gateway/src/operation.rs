//! The operation an execution context performs.
//!
//! Both execution modes run the same [`BackendOperation`]: in task mode it is
//! called directly, in process mode the `context` subcommand rebuilds it from
//! the [`ContextSettings`] it receives on stdin.

use async_trait::async_trait;
use job_supervisor::Operation;
use relay_common::{FailureReason, Job, OperationFailure, OperationKind, OperationResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use crate::backend::{Backend, HttpBackend};
use crate::identity::OperationalIdentity;
use crate::mock_backend::MockBackend;

/// Read-only configuration copied into every execution context.
///
/// Carries paths and URLs, never live clients or key material, so each
/// context constructs its own identity and backend session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default)]
    pub mock_mode: bool,

    #[serde(default)]
    pub mock_latency_ms: u64,

    #[serde(default)]
    pub backend_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_path: Option<PathBuf>,
}

impl ContextSettings {
    /// Mock backend with the development identity.
    pub fn mock(latency: Duration) -> Self {
        Self {
            mock_mode: true,
            mock_latency_ms: latency.as_millis() as u64,
            backend_url: String::new(),
            identity_path: None,
        }
    }

    pub fn load_identity(&self) -> anyhow::Result<OperationalIdentity> {
        match (&self.identity_path, self.mock_mode) {
            (Some(path), _) => OperationalIdentity::load(path),
            (None, true) => Ok(OperationalIdentity::development()),
            (None, false) => anyhow::bail!("No identity file configured"),
        }
    }

    /// Build a backend client acting as `identity`.
    pub fn backend(&self, identity: OperationalIdentity) -> Box<dyn Backend> {
        if self.mock_mode {
            Box::new(MockBackend::new(
                identity,
                Duration::from_millis(self.mock_latency_ms),
            ))
        } else {
            Box::new(HttpBackend::new(self.backend_url.clone(), identity))
        }
    }

    /// Build a fresh identity and backend client.
    pub fn connect(&self) -> anyhow::Result<Box<dyn Backend>> {
        Ok(self.backend(self.load_identity()?))
    }

    /// Endpoint shown on the health check.
    pub fn endpoint(&self) -> &str {
        if self.mock_mode {
            crate::mock_backend::MOCK_ENDPOINT
        } else {
            &self.backend_url
        }
    }
}

/// Deposit or withdraw through the configured backend.
#[derive(Debug, Clone)]
pub struct BackendOperation {
    settings: ContextSettings,
}

impl BackendOperation {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Operation for BackendOperation {
    async fn execute(&self, job: Job) -> Result<OperationResult, OperationFailure> {
        // Re-checked here as well: a context can be fed a job directly.
        job.params.validate(job.kind).map_err(|e| {
            OperationFailure::new(FailureReason::InvalidJob, e.to_string())
        })?;

        let backend = self.settings.connect().map_err(|e| {
            error!(correlation_id = %job.correlation_id, "Failed to load identity: {:#}", e);
            OperationFailure::new(FailureReason::IdentityUnavailable, format!("{:#}", e))
        })?;

        info!(
            correlation_id = %job.correlation_id,
            kind = %job.kind,
            endpoint = backend.endpoint(),
            "Executing operation"
        );

        let result = match job.kind {
            OperationKind::Deposit => backend.deposit(&job).await,
            OperationKind::Withdraw => backend.withdraw(&job).await,
        };

        result.map_err(OperationFailure::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::JobParams;

    #[tokio::test]
    async fn test_mock_deposit() {
        let operation = BackendOperation::new(ContextSettings::mock(Duration::ZERO));
        let result = operation.execute(Job::deposit(5_000_000).unwrap()).await.unwrap();
        assert_eq!(result.amount, 5_000_000);
        assert!(!result.reference.is_empty());
    }

    #[tokio::test]
    async fn test_missing_identity_is_reported() {
        let settings = ContextSettings {
            mock_mode: false,
            backend_url: "http://127.0.0.1:1".to_string(),
            ..ContextSettings::default()
        };
        let failure = BackendOperation::new(settings)
            .execute(Job::deposit(1).unwrap())
            .await
            .unwrap_err();
        assert_eq!(failure.reason, FailureReason::IdentityUnavailable);
    }

    #[tokio::test]
    async fn test_invalid_job_is_rejected_inside_context() {
        let mut job = Job::deposit(1).unwrap();
        job.params = JobParams {
            amount: 0,
            recipient: None,
            reference: None,
        };

        let failure = BackendOperation::new(ContextSettings::mock(Duration::ZERO))
            .execute(job)
            .await
            .unwrap_err();
        assert_eq!(failure.reason, FailureReason::InvalidJob);
    }

    #[test]
    fn test_settings_round_trip_through_json() {
        let settings = ContextSettings {
            mock_mode: false,
            mock_latency_ms: 0,
            backend_url: "http://backend:8899".to_string(),
            identity_path: Some(PathBuf::from("/etc/relay/identity.json")),
        };
        let value = serde_json::to_value(&settings).unwrap();
        let decoded: ContextSettings = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, settings);
    }
}
