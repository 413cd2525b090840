//! Context-side runtime.
//!
//! A child process started by [`crate::ProcessExecutor`] receives one
//! [`ContextRequest`] as a JSON line on stdin and must answer with exactly one
//! [`ExecutionReport`] line on stdout. Everything else the process wants to
//! say goes to stderr.

use std::future::Future;
use std::time::Instant;

use relay_common::{
    ExecutionReport, FailureReason, Job, OperationFailure, OperationResult,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// What crosses the isolation boundary: the job plus opaque settings the
/// context needs to rebuild its own client state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest<S = serde_json::Value> {
    pub job: Job,
    #[serde(default)]
    pub settings: S,
}

/// Run an operation and stamp its duration into the result.
pub async fn execute_measured<F>(operation: F) -> ExecutionReport
where
    F: Future<Output = Result<OperationResult, OperationFailure>>,
{
    let started = Instant::now();
    let mut result = operation.await;

    if let Ok(ref mut r) = result {
        r.duration_ms = started.elapsed().as_millis() as u64;
    }

    ExecutionReport::from(result)
}

/// Serve one request over stdin/stdout.
pub async fn serve_stdio<S, F, Fut>(handler: F) -> anyhow::Result<()>
where
    S: DeserializeOwned + Default,
    F: FnOnce(Job, S) -> Fut,
    Fut: Future<Output = Result<OperationResult, OperationFailure>>,
{
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    serve(stdin, &mut stdout, handler).await
}

/// Serve one request from `input`, writing the single report to `output`.
///
/// An unreadable request still produces a failure report so the owner gets a
/// diagnostic instead of an unexplained exit.
pub async fn serve<R, W, S, F, Fut>(mut input: R, output: &mut W, handler: F) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: DeserializeOwned + Default,
    F: FnOnce(Job, S) -> Fut,
    Fut: Future<Output = Result<OperationResult, OperationFailure>>,
{
    let mut line = String::new();
    input.read_line(&mut line).await?;

    let report = match serde_json::from_str::<ContextRequest<S>>(line.trim()) {
        Ok(request) => {
            info!(
                correlation_id = %request.job.correlation_id,
                kind = %request.job.kind,
                "Execution context started"
            );
            execute_measured(handler(request.job, request.settings)).await
        }
        Err(e) => {
            warn!("Malformed context request: {}", e);
            ExecutionReport::Failure {
                reason: FailureReason::InvalidJob,
                detail: format!("malformed context request: {}", e),
            }
        }
    };

    write_report(output, &report).await?;
    Ok(())
}

/// Write a report as a single JSON line and flush.
pub async fn write_report<W>(output: &mut W, report: &ExecutionReport) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(report)?;
    line.push(b'\n');
    output.write_all(&line).await?;
    output.flush().await?;
    Ok(())
}
