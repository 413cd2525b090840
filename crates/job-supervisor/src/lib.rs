//! Job Supervisor
//!
//! Runs each job in its own isolated execution context and resolves the
//! caller exactly once, whichever of the following happens first:
//!
//! - the context reports success or failure
//! - the context dies without reporting (panic, crash, non-zero exit)
//! - the job's deadline elapses
//!
//! The context is then forcibly torn down, and `run` returns only after
//! teardown is confirmed, so a timed-out job never leaves a context running.
//!
//! **Components:**
//! - `executor`: the `Executor` / `Operation` seams and the `ExecutionHandle`
//! - `task_executor`: contexts as dedicated tokio tasks
//! - `process_executor`: contexts as child OS processes (memory isolation)
//! - `context`: the context-side runtime used inside a child process
//! - `supervisor`: deadline race, teardown and bookkeeping

pub mod context;
pub mod error;
pub mod executor;
pub mod process_executor;
pub mod supervisor;
pub mod task_executor;

pub use context::{serve_stdio, ContextRequest};
pub use error::SupervisorError;
pub use executor::{ExecutionHandle, Executor, Operation, Termination};
pub use process_executor::ProcessExecutor;
pub use supervisor::{JobState, StatsSnapshot, Supervisor};
pub use task_executor::TaskExecutor;
