//! Seams between the supervisor and the units that do the work.

use async_trait::async_trait;
use relay_common::{ExecutionReport, Job, OperationFailure, OperationResult};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SupervisorError;

/// The expensive external operation, as run inside an execution context.
///
/// Implementations receive an owned copy of the job and must build any
/// client or signing state they need from it; nothing mutable is shared
/// between concurrent contexts.
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    async fn execute(&self, job: Job) -> Result<OperationResult, OperationFailure>;
}

/// Creates one execution context per job.
pub trait Executor: Send + Sync {
    /// Start a context for `job`. The job is copied into the context.
    fn spawn(&self, job: &Job) -> Result<ExecutionHandle, SupervisorError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// How an execution context ended, as observed by its runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The unit finished on its own. For processes `code` is the exit
    /// code, `signal` is set when a signal ended it.
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    /// The unit panicked
    Panicked { detail: String },
    /// The unit was torn down by its owner
    Killed,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited {
                code: Some(code), ..
            } => write!(f, "exited with code {}", code),
            Termination::Exited {
                signal: Some(signal),
                ..
            } => write!(f, "killed by signal {}", signal),
            Termination::Exited { .. } => write!(f, "exited"),
            Termination::Panicked { detail } => write!(f, "panicked: {}", detail),
            Termination::Killed => write!(f, "was killed"),
        }
    }
}

/// Owner's side of a live execution context.
///
/// Exposes the three event sources the supervisor races: the one-shot report
/// channel, the one-shot termination signal, and (held by the supervisor) the
/// deadline. Dropping the handle without calling [`teardown`] still requests
/// termination, so an abandoned job cannot leak its context.
///
/// [`teardown`]: ExecutionHandle::teardown
pub struct ExecutionHandle {
    pub(crate) report: oneshot::Receiver<ExecutionReport>,
    pub(crate) termination: oneshot::Receiver<Termination>,
    shutdown: CancellationToken,
    monitor: Option<JoinHandle<()>>,
}

impl ExecutionHandle {
    /// `monitor` must own the unit, stop it when `shutdown` is cancelled,
    /// and only finish once the unit is gone.
    pub fn new(
        report: oneshot::Receiver<ExecutionReport>,
        termination: oneshot::Receiver<Termination>,
        shutdown: CancellationToken,
        monitor: JoinHandle<()>,
    ) -> Self {
        Self {
            report,
            termination,
            shutdown,
            monitor: Some(monitor),
        }
    }

    /// Forcibly stop the context and wait until it is confirmed gone.
    ///
    /// Safe to call after the context already exited.
    pub async fn teardown(mut self) {
        self.shutdown.cancel();

        if let Some(monitor) = self.monitor.take() {
            if let Err(e) = monitor.await {
                warn!("Execution context monitor ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ExecutionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_display() {
        let exited = Termination::Exited {
            code: Some(3),
            signal: None,
        };
        assert_eq!(exited.to_string(), "exited with code 3");

        let signalled = Termination::Exited {
            code: None,
            signal: Some(9),
        };
        assert_eq!(signalled.to_string(), "killed by signal 9");

        assert_eq!(Termination::Killed.to_string(), "was killed");
    }

    #[tokio::test]
    async fn test_dropping_handle_requests_shutdown() {
        let (_report_tx, report_rx) = oneshot::channel();
        let (_term_tx, term_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let observed = shutdown.clone();

        let watcher = observed.clone();
        let monitor = tokio::spawn(async move { watcher.cancelled().await });

        let handle = ExecutionHandle::new(report_rx, term_rx, shutdown, monitor);
        assert!(!observed.is_cancelled());
        drop(handle);
        assert!(observed.is_cancelled());
    }
}
