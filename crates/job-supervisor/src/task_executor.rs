//! Execution contexts as dedicated tokio tasks.
//!
//! Suitable for operations that are themselves async and yield regularly:
//! teardown aborts the task at its next suspension point. CPU-bound or
//! blocking work belongs in a [`crate::ProcessExecutor`] instead, which can
//! kill the unit outright.

use std::any::Any;
use std::sync::Arc;

use relay_common::Job;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::execute_measured;
use crate::error::SupervisorError;
use crate::executor::{ExecutionHandle, Executor, Operation, Termination};

/// Runs each job's operation on its own task.
#[derive(Clone)]
pub struct TaskExecutor {
    operation: Arc<dyn Operation>,
}

impl TaskExecutor {
    pub fn new(operation: Arc<dyn Operation>) -> Self {
        Self { operation }
    }
}

impl Executor for TaskExecutor {
    fn spawn(&self, job: &Job) -> Result<ExecutionHandle, SupervisorError> {
        let (report_tx, report_rx) = oneshot::channel();
        let (termination_tx, termination_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let operation = Arc::clone(&self.operation);
        let job = job.clone();
        let correlation_id = job.correlation_id;

        let mut context = tokio::spawn(async move {
            let report = execute_measured(operation.execute(job)).await;
            // The receiver is gone only if the owner already resolved the job
            let _ = report_tx.send(report);
        });

        let token = shutdown.clone();
        let monitor = tokio::spawn(async move {
            let termination = tokio::select! {
                joined = &mut context => match joined {
                    Ok(()) => Termination::Exited { code: Some(0), signal: None },
                    Err(e) if e.is_panic() => Termination::Panicked {
                        detail: panic_message(e.into_panic()),
                    },
                    Err(_) => Termination::Killed,
                },
                _ = token.cancelled() => {
                    context.abort();
                    // Wait until the aborted future has actually been dropped
                    let _ = context.await;
                    Termination::Killed
                }
            };

            debug!(%correlation_id, %termination, "Task context finished");
            let _ = termination_tx.send(termination);
        });

        Ok(ExecutionHandle::new(report_rx, termination_rx, shutdown, monitor))
    }

    fn name(&self) -> &'static str {
        "task"
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
