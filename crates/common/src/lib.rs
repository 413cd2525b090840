//! Shared types for the shielded relay services.
//!
//! Everything that crosses a service or isolation boundary lives here: the
//! [`Job`] handed to the supervisor, the single [`ExecutionReport`] an
//! execution context sends back, the [`Outcome`] the caller receives, and the
//! HTTP wire models spoken between the public tier and the relay gateway.

pub mod credential;
pub mod environment;
pub mod error;
pub mod job;
pub mod models;
pub mod outcome;
pub mod validation;

pub use credential::Credential;
pub use environment::Environment;
pub use error::{Error, ErrorCode, Result};
pub use job::{Job, JobParams, OperationKind, DEFAULT_DEADLINE, MAX_DEADLINE};
pub use outcome::{
    ExecutionReport, FailureReason, OperationFailure, OperationResult, Outcome, TerminalState,
};
