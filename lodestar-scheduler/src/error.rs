//! Error types for scheduler operations.

use thiserror::Error;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No tokio runtime is available to drive scheduled tasks
    #[error("No runtime available: {0}")]
    NoRuntime(String),

    /// The scheduler was shut down and accepts no more work
    #[error("Scheduler shut down")]
    ShutDown,
}
