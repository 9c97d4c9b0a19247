//! Error types for queue operations.
//!
//! [`QueueError`] covers infrastructure failures of the queue itself;
//! [`JobError`] is the outcome a handler reports for one execution and
//! determines whether the job is retried or discarded.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by the queue client and runner.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Database operation failed.
    #[error("queue database error: {0}")]
    Database(String),

    /// Job payload could not be serialized or deserialized.
    #[error("job payload serialization failed: {0}")]
    Serialization(String),

    /// A claimed job's kind has no registered handler.
    #[error("no handler registered for job kind '{kind}'")]
    UnknownKind {
        /// The unrecognised kind discriminator.
        kind: String,
    },

    /// Workers did not finish draining within the grace period.
    #[error("queue shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// The grace period that elapsed.
        timeout: Duration,
    },
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Outcome of a single handler execution.
///
/// Returning `Ok(())` from a handler completes the job and flushes its
/// staged enqueues. These variants cover the failure paths.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Transient failure: re-run the job with backoff until the system
    /// attempt cap, dropping anything staged this execution.
    #[error("retryable job failure: {0}")]
    Retry(String),

    /// Terminal failure: discard the job, never re-run it.
    #[error("job discarded: {0}")]
    Discard(String),
}

impl JobError {
    /// Creates a retryable failure from a message.
    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retry(message.into())
    }

    /// Creates a terminal failure from a message.
    pub fn discard(message: impl Into<String>) -> Self {
        Self::Discard(message.into())
    }

    /// Returns true when the queue should schedule another run.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}
