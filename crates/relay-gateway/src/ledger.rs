//! Recent-job ledger
//!
//! Keeps the last few hundred jobs in memory so a caller whose request timed
//! out can look up what the relay knows about it. A timed-out or crashed job
//! is reported with `external_state: "unknown"`: the backend may or may not
//! have executed it, and the ledger does not try to find out.

use chrono::{DateTime, Utc};
use relay_common::{ErrorCode, Job, OperationKind, Outcome, TerminalState};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_LEDGER_CAPACITY: usize = 512;

/// What the relay can say about the external effect of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalState {
    /// Still running
    Pending,
    /// The backend confirmed the operation
    Confirmed,
    /// The backend reported a failure
    Rejected,
    /// The context never reported; the operation may have been submitted
    Unknown,
}

/// One job as seen by `GET /jobs/{correlation_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub correlation_id: Uuid,
    pub kind: OperationKind,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// `running` or a terminal state name
    pub state: String,
    pub external_state: ExternalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub accepted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<Uuid, JobRecord>,
    order: VecDeque<Uuid>,
}

/// Bounded in-memory job history; oldest entries are evicted first.
pub struct JobLedger {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}

impl JobLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Record a job as running.
    pub async fn record_accepted(&self, job: &Job) {
        let record = JobRecord {
            correlation_id: job.correlation_id,
            kind: job.kind,
            amount: job.params.amount,
            recipient: job.params.recipient.clone(),
            state: "running".to_string(),
            external_state: ExternalState::Pending,
            reference: None,
            code: None,
            message: None,
            accepted_at: Utc::now(),
            resolved_at: None,
        };

        let mut inner = self.inner.write().await;
        if inner.records.insert(job.correlation_id, record).is_none() {
            inner.order.push_back(job.correlation_id);
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.records.remove(&evicted);
            }
        }
    }

    /// Record a job's terminal state. Unknown ids (already evicted) are ignored.
    pub async fn record_outcome(&self, outcome: &Outcome) {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(&outcome.correlation_id) else {
            return;
        };

        record.state = outcome.state.name().to_string();
        record.external_state = match &outcome.state {
            TerminalState::Succeeded(_) => ExternalState::Confirmed,
            TerminalState::Failed(_) => ExternalState::Rejected,
            TerminalState::TimedOut { .. } | TerminalState::Crashed { .. } => ExternalState::Unknown,
        };
        record.reference = outcome.result().map(|r| r.reference.clone());
        record.code = outcome.error_code();
        record.message = outcome.message();
        record.resolved_at = Some(Utc::now());
    }

    /// Mark a still-running job whose caller went away. Its context has
    /// been torn down, but the operation may already have been submitted.
    pub async fn record_abandoned(&self, correlation_id: &Uuid) {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(correlation_id) else {
            return;
        };
        if record.resolved_at.is_some() {
            return;
        }

        record.state = "abandoned".to_string();
        record.external_state = ExternalState::Unknown;
        record.message = Some("Request was abandoned before the job resolved".to_string());
        record.resolved_at = Some(Utc::now());
    }

    pub async fn get(&self, correlation_id: &Uuid) -> Option<JobRecord> {
        self.inner.read().await.records.get(correlation_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }
}

/// Ledger entry for a job in flight.
///
/// If dropped before [`PendingEntry::resolve`], the handler future was
/// cancelled and the entry is marked abandoned.
pub struct PendingEntry {
    ledger: Arc<JobLedger>,
    correlation_id: Uuid,
    resolved: bool,
}

impl PendingEntry {
    pub async fn open(ledger: Arc<JobLedger>, job: &Job) -> Self {
        ledger.record_accepted(job).await;
        Self {
            ledger,
            correlation_id: job.correlation_id,
            resolved: false,
        }
    }

    pub async fn resolve(mut self, outcome: &Outcome) {
        self.resolved = true;
        self.ledger.record_outcome(outcome).await;
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let ledger = Arc::clone(&self.ledger);
        let correlation_id = self.correlation_id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { ledger.record_abandoned(&correlation_id).await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::OperationResult;
    use std::time::Duration;

    fn outcome(job: &Job, state: TerminalState) -> Outcome {
        Outcome {
            correlation_id: job.correlation_id,
            elapsed: Duration::from_millis(5),
            state,
        }
    }

    #[tokio::test]
    async fn test_running_then_confirmed() {
        let ledger = JobLedger::default();
        let job = Job::deposit(5_000_000).unwrap();

        ledger.record_accepted(&job).await;
        let running = ledger.get(&job.correlation_id).await.unwrap();
        assert_eq!(running.state, "running");
        assert_eq!(running.external_state, ExternalState::Pending);

        ledger
            .record_outcome(&outcome(
                &job,
                TerminalState::Succeeded(OperationResult {
                    reference: "sig".to_string(),
                    amount: 5_000_000,
                    recipient: None,
                    partial: None,
                    fee: None,
                    commitment: None,
                    duration_ms: 1,
                }),
            ))
            .await;

        let done = ledger.get(&job.correlation_id).await.unwrap();
        assert_eq!(done.state, "succeeded");
        assert_eq!(done.external_state, ExternalState::Confirmed);
        assert_eq!(done.reference.as_deref(), Some("sig"));
        assert!(done.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_unknown() {
        let ledger = JobLedger::default();
        let job = Job::deposit(1).unwrap();
        ledger.record_accepted(&job).await;
        ledger
            .record_outcome(&outcome(
                &job,
                TerminalState::TimedOut {
                    deadline: Duration::from_millis(1),
                },
            ))
            .await;

        let record = ledger.get(&job.correlation_id).await.unwrap();
        assert_eq!(record.external_state, ExternalState::Unknown);
        assert_eq!(record.code, Some(ErrorCode::Timeout));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["external_state"], "unknown");
        assert_eq!(json["state"], "timed_out");
    }

    #[tokio::test]
    async fn test_oldest_entries_are_evicted() {
        let ledger = JobLedger::new(2);
        let jobs: Vec<Job> = (1..=3).map(|i| Job::deposit(i).unwrap()).collect();
        for job in &jobs {
            ledger.record_accepted(job).await;
        }

        assert_eq!(ledger.len().await, 2);
        assert!(ledger.get(&jobs[0].correlation_id).await.is_none());
        assert!(ledger.get(&jobs[2].correlation_id).await.is_some());

        // Outcome for an evicted job is dropped quietly
        ledger
            .record_outcome(&outcome(&jobs[0], TerminalState::Crashed { detail: "x".into() }))
            .await;
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_dropped_entry_is_abandoned() {
        let ledger = Arc::new(JobLedger::default());
        let job = Job::deposit(1).unwrap();

        let entry = PendingEntry::open(Arc::clone(&ledger), &job).await;
        drop(entry);

        for _ in 0..50 {
            if ledger.get(&job.correlation_id).await.unwrap().state == "abandoned" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let record = ledger.get(&job.correlation_id).await.unwrap();
        assert_eq!(record.state, "abandoned");
        assert_eq!(record.external_state, ExternalState::Unknown);
    }

    #[tokio::test]
    async fn test_resolved_entry_is_not_abandoned() {
        let ledger = Arc::new(JobLedger::default());
        let job = Job::deposit(1).unwrap();

        let entry = PendingEntry::open(Arc::clone(&ledger), &job).await;
        entry
            .resolve(&outcome(&job, TerminalState::Crashed { detail: "boom".into() }))
            .await;
        tokio::task::yield_now().await;

        let record = ledger.get(&job.correlation_id).await.unwrap();
        assert_eq!(record.state, "crashed");
    }
}
