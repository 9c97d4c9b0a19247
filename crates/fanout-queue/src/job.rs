//! Job model: typed payloads and the persisted job row.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::{error::Result, DEFAULT_MAX_SYSTEM_ATTEMPTS, DEFAULT_QUEUE};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Typed job payload.
///
/// Implementors are plain serde structs; the `KIND` discriminator routes a
/// stored payload back to its handler and `QUEUE` picks the worker pool.
///
/// # Example
///
/// ```
/// use fanout_queue::JobArgs;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct CleanupArgs {
///     older_than_days: u32,
/// }
///
/// impl JobArgs for CleanupArgs {
///     const KIND: &'static str = "cleanup";
/// }
/// ```
pub trait JobArgs: Serialize {
    /// Kind discriminator stored with the job row.
    const KIND: &'static str;

    /// Named queue the job is routed to.
    const QUEUE: &'static str = DEFAULT_QUEUE;

    /// System-level attempt cap for jobs of this kind.
    const MAX_ATTEMPTS: i32 = DEFAULT_MAX_SYSTEM_ATTEMPTS;
}

/// Lifecycle state of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for a worker; due once `run_after` passes.
    Available,

    /// Claimed by a worker and executing.
    Running,

    /// Handler returned success. Terminal.
    Completed,

    /// Handler failed terminally or the attempt cap was reached. Terminal.
    Discarded,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

impl sqlx::Type<PgDb> for JobState {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JobState {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "available" => Ok(Self::Available),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "discarded" => Ok(Self::Discarded),
            _ => Err(format!("invalid job state: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for JobState {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A job row as claimed from the queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    /// Monotonic job id.
    pub id: i64,

    /// Kind discriminator used for handler dispatch.
    pub kind: String,

    /// Named queue the job belongs to.
    pub queue: String,

    /// JSON payload as stored.
    pub payload: sqlx::types::Json<serde_json::Value>,

    /// Current lifecycle state.
    pub state: JobState,

    /// Executions so far, including the current one.
    pub attempt: i32,

    /// System-level attempt cap.
    pub max_attempts: i32,

    /// Earliest instant the job may run.
    pub run_after: DateTime<Utc>,

    /// Error message from the most recent failed execution.
    pub last_error: Option<String>,

    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Deserializes the payload into typed args.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Serialization` when the stored payload does not
    /// match the expected shape. Handlers treat this as a terminal failure:
    /// a payload that never parsed will never parse.
    pub fn args<A: DeserializeOwned>(&self) -> Result<A> {
        Ok(serde_json::from_value(self.payload.0.clone())?)
    }
}
