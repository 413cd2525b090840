//! Deadline race and exactly-once resolution.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use relay_common::{Job, Outcome, TerminalState};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::executor::{ExecutionHandle, Executor, Termination};

/// Lifecycle of one job inside the supervisor.
///
/// `Idle → Spawning → Running → {Succeeded, Failed, TimedOut, Crashed} → Terminated`.
/// Every terminal state goes through the same teardown before `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Spawning,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Crashed,
    Terminated,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Crashed
        )
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Idle, Spawning) => true,
            // Waiting for a free slot can outlast the deadline, and a spawn
            // can fail before anything runs.
            (Idle, TimedOut) | (Spawning, Crashed) | (Spawning, TimedOut) => true,
            (Spawning, Running) => true,
            (Running, Succeeded | Failed | TimedOut | Crashed) => true,
            (from, Terminated) => from.is_terminal(),
            _ => false,
        }
    }

    fn of(state: &TerminalState) -> JobState {
        match state {
            TerminalState::Succeeded(_) => JobState::Succeeded,
            TerminalState::Failed(_) => JobState::Failed,
            TerminalState::TimedOut { .. } => JobState::TimedOut,
            TerminalState::Crashed { .. } => JobState::Crashed,
        }
    }
}

/// Tracks one job's state and traces each transition.
struct Lifecycle {
    job: Uuid,
    state: JobState,
}

impl Lifecycle {
    fn new(job: Uuid) -> Self {
        Self {
            job,
            state: JobState::Idle,
        }
    }

    fn advance(&mut self, next: JobState) {
        if !self.state.can_transition_to(next) {
            error!(correlation_id = %self.job, from = ?self.state, to = ?next, "Invalid job state transition");
        }
        debug!(correlation_id = %self.job, from = ?self.state, to = ?next, "Job state transition");
        self.state = next;
    }
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    active: AtomicUsize,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    crashed: AtomicU64,
}

/// Point-in-time view of the supervisor counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub started: u64,
    pub active: usize,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub crashed: u64,
}

/// Decrements the active-context gauge however `run` exits.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(gauge: &'a AtomicUsize) -> Self {
        gauge.fetch_add(1, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs jobs in isolated execution contexts.
pub struct Supervisor {
    executor: Arc<dyn Executor>,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    counters: Counters,
}

impl Supervisor {
    /// `max_concurrent` bounds live contexts; further jobs wait for a slot,
    /// and that wait counts against their deadline.
    pub fn new(executor: Arc<dyn Executor>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            executor,
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            counters: Counters::default(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let c = &self.counters;
        StatsSnapshot {
            started: c.started.load(Ordering::SeqCst),
            active: c.active.load(Ordering::SeqCst),
            succeeded: c.succeeded.load(Ordering::SeqCst),
            failed: c.failed.load(Ordering::SeqCst),
            timed_out: c.timed_out.load(Ordering::SeqCst),
            crashed: c.crashed.load(Ordering::SeqCst),
        }
    }

    /// Run `job` to exactly one terminal state.
    ///
    /// Returns only after the job's execution context has been torn down.
    /// Nothing is retried here.
    pub async fn run(&self, job: Job) -> Outcome {
        let started = Instant::now();
        let correlation_id = job.correlation_id;
        let deadline = job.deadline;
        let mut lifecycle = Lifecycle::new(correlation_id);

        // Armed before the spawn so slot waits and startup count too
        let timer = tokio::time::sleep(deadline);
        tokio::pin!(timer);

        self.counters.started.fetch_add(1, Ordering::SeqCst);
        info!(
            %correlation_id,
            kind = %job.kind,
            amount = job.params.amount,
            deadline_ms = deadline.as_millis() as u64,
            executor = self.executor.name(),
            "Job accepted"
        );

        let permit = tokio::select! {
            permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    lifecycle.advance(JobState::Spawning);
                    return self.finish(lifecycle, started, TerminalState::Crashed {
                        detail: "supervisor is shutting down".to_string(),
                    });
                }
            },
            _ = &mut timer => {
                warn!(%correlation_id, "Job timed out waiting for a free execution slot");
                return self.finish(lifecycle, started, TerminalState::TimedOut { deadline });
            }
        };

        lifecycle.advance(JobState::Spawning);
        let mut handle = match self.executor.spawn(&job) {
            Ok(handle) => handle,
            Err(e) => {
                error!(%correlation_id, "{}", e);
                drop(permit);
                return self.finish(lifecycle, started, TerminalState::Crashed {
                    detail: e.to_string(),
                });
            }
        };

        lifecycle.advance(JobState::Running);
        let state = {
            let _active = ActiveGuard::enter(&self.counters.active);
            let state = race(&mut handle, timer.as_mut(), deadline).await;
            lifecycle.advance(JobState::of(&state));

            // Single teardown path for every terminal state
            handle.teardown().await;
            state
        };
        drop(permit);

        self.finish(lifecycle, started, state)
    }

    fn finish(&self, mut lifecycle: Lifecycle, started: Instant, state: TerminalState) -> Outcome {
        if !lifecycle.state.is_terminal() {
            lifecycle.advance(JobState::of(&state));
        }
        lifecycle.advance(JobState::Terminated);

        let counter = match &state {
            TerminalState::Succeeded(_) => &self.counters.succeeded,
            TerminalState::Failed(_) => &self.counters.failed,
            TerminalState::TimedOut { .. } => &self.counters.timed_out,
            TerminalState::Crashed { .. } => &self.counters.crashed,
        };
        counter.fetch_add(1, Ordering::SeqCst);

        let outcome = Outcome {
            correlation_id: lifecycle.job,
            elapsed: started.elapsed(),
            state,
        };

        match &outcome.state {
            TerminalState::Succeeded(result) => info!(
                correlation_id = %outcome.correlation_id,
                reference = %result.reference,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Job succeeded"
            ),
            other => warn!(
                correlation_id = %outcome.correlation_id,
                state = other.name(),
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                message = %outcome.message().unwrap_or_default(),
                "Job did not succeed"
            ),
        }

        outcome
    }
}

/// Wait for the first of: report, termination, deadline.
async fn race(
    handle: &mut ExecutionHandle,
    timer: std::pin::Pin<&mut tokio::time::Sleep>,
    deadline: std::time::Duration,
) -> TerminalState {
    tokio::select! {
        // A report is always sent before its context's termination signal,
        // so checking it first means a reporting context is never mistaken
        // for a crash.
        biased;

        Ok(report) = &mut handle.report => TerminalState::from(report),
        termination = &mut handle.termination => match termination {
            Ok(Termination::Killed) => TerminalState::Crashed {
                detail: "context was killed externally".to_string(),
            },
            Ok(termination) => TerminalState::Crashed {
                detail: format!("context {} without reporting", termination),
            },
            Err(_) => TerminalState::Crashed {
                detail: "context monitor was lost".to_string(),
            },
        },
        _ = timer => TerminalState::TimedOut { deadline },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_state_reenters_running() {
        for state in [
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Crashed,
            JobState::Terminated,
        ] {
            assert!(!state.can_transition_to(JobState::Running), "{:?}", state);
        }
    }

    #[test]
    fn test_invalid_transition_is_logged_not_fatal() {
        let mut lifecycle = Lifecycle::new(Uuid::new_v4());
        lifecycle.advance(JobState::Running);
        assert_eq!(lifecycle.state, JobState::Running);

        lifecycle.advance(JobState::Idle);
        assert_eq!(lifecycle.state, JobState::Idle);
    }

    #[test]
    fn test_terminal_states_converge_on_terminated() {
        for state in [
            JobState::Succeeded,
            JobState::Failed,
            JobState::TimedOut,
            JobState::Crashed,
        ] {
            assert!(state.is_terminal());
            assert!(state.can_transition_to(JobState::Terminated));
        }
        assert!(!JobState::Running.can_transition_to(JobState::Terminated));
        assert!(!JobState::Terminated.can_transition_to(JobState::Terminated));
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobState::Idle.can_transition_to(JobState::Spawning));
        assert!(JobState::Spawning.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Succeeded));
        assert!(!JobState::Idle.can_transition_to(JobState::Running));
    }
}
