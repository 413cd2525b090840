//! Execution contexts as child OS processes.
//!
//! Each job gets a fresh process with its own address space, so a large
//! proving working set is returned to the OS when the process exits and a
//! runaway context can be killed outright. The job travels as one JSON line
//! on stdin; the first line the child writes to stdout is its report.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use relay_common::{ExecutionReport, Job};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::ContextRequest;
use crate::error::SupervisorError;
use crate::executor::{ExecutionHandle, Executor, Termination};

/// How long to wait for buffered stdout after the child exits, in case a
/// grandchild inherited the pipe and keeps it open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Spawns one child process per job.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
    args: Vec<String>,
    settings: serde_json::Value,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            settings: serde_json::Value::Null,
        }
    }

    /// Re-run the current binary with `args`, e.g. a `context` subcommand.
    pub fn current_exe(args: Vec<String>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    /// Settings copied into every [`ContextRequest`].
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}

impl Executor for ProcessExecutor {
    fn spawn(&self, job: &Job) -> Result<ExecutionHandle, SupervisorError> {
        let request = ContextRequest {
            job: job.clone(),
            settings: self.settings.clone(),
        };
        let mut payload = serde_json::to_vec(&request)?;
        payload.push(b'\n');

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        let correlation_id = job.correlation_id;
        debug!(%correlation_id, pid = ?child.id(), "Spawned context process");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let (report_tx, report_rx) = oneshot::channel();
        let (termination_tx, termination_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let mut io = tokio::spawn(exchange(stdin, stdout, payload, report_tx));

        let token = shutdown.clone();
        let monitor = tokio::spawn(async move {
            let termination = tokio::select! {
                status = child.wait() => {
                    // The report line may still be in the pipe; deliver it
                    // before announcing the exit.
                    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut io).await.is_err() {
                        io.abort();
                    }
                    match status {
                        Ok(status) => Termination::Exited {
                            code: status.code(),
                            signal: exit_signal(&status),
                        },
                        Err(e) => {
                            warn!(%correlation_id, "Failed to wait on context process: {}", e);
                            Termination::Exited { code: None, signal: None }
                        }
                    }
                }
                _ = token.cancelled() => {
                    // kill() also reaps the child
                    if let Err(e) = child.kill().await {
                        warn!(%correlation_id, "Failed to kill context process: {}", e);
                    }
                    io.abort();
                    let _ = io.await;
                    Termination::Killed
                }
            };

            debug!(%correlation_id, %termination, "Context process finished");
            let _ = termination_tx.send(termination);
        });

        Ok(ExecutionHandle::new(report_rx, termination_rx, shutdown, monitor))
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Feed the request to the child and forward its first output line.
async fn exchange(
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    payload: Vec<u8>,
    report_tx: oneshot::Sender<ExecutionReport>,
) {
    if let Some(mut stdin) = stdin {
        // A child that exits without reading its input closes the pipe;
        // that is reported through its exit status, not here.
        if let Err(e) = stdin.write_all(&payload).await {
            debug!("Context process did not accept its request: {}", e);
        }
        drop(stdin);
    }

    let Some(stdout) = stdout else {
        return;
    };
    let mut lines = BufReader::new(stdout).lines();

    match lines.next_line().await {
        Ok(Some(line)) => match serde_json::from_str::<ExecutionReport>(&line) {
            Ok(report) => {
                let _ = report_tx.send(report);
            }
            Err(e) => warn!("Context process wrote a malformed report: {}", e),
        },
        Ok(None) => return,
        Err(e) => {
            warn!("Failed to read context process output: {}", e);
            return;
        }
    }

    while let Ok(Some(extra)) = lines.next_line().await {
        warn!(line = %extra, "Ignoring output after the context report");
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
