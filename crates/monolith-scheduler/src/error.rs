//! Scheduler error types.

use thiserror::Error;

/// Errors from registering, running, or executing jobs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job already registered: {0}")]
    DuplicateJob(String),

    #[error("job not found: {0}")]
    UnknownJob(String),

    #[error("scheduler is shut down")]
    ShutDown,

    /// A job body failed. Logged at the orchestrator boundary, never
    /// propagated to other jobs.
    #[error("job {job} failed: {reason}")]
    JobExecution { job: String, reason: String },
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
