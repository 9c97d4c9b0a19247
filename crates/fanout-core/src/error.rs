//! Error types and result handling for core operations.
//!
//! The variants map onto the failure categories surfaced to callers:
//! `InvalidInput` for malformed caller input, `NotFound` for absent rows,
//! `ConstraintViolation` for database constraint breakage, and `Database`
//! for transient store failures that workers translate into retries.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage and domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed. Treated as transient by workers.
    #[error("database error: {0}")]
    Database(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A database constraint rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Caller supplied malformed input. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Creates an `InvalidInput` error from a message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns true when the failure is worth retrying.
    ///
    /// Only transient database failures qualify; validation and lookup
    /// failures are deterministic.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                Self::ConstraintViolation(format!("check constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}
