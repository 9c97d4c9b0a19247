//! Queue client for inserting jobs.
//!
//! The client is cheap to clone and shared between the public service API
//! and handlers that fan out follow-up work. Inserts are plain rows in
//! `queue_jobs`; durability comes from the surrounding transaction.

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, Transaction};

use crate::{
    error::Result,
    job::JobArgs,
    worker::PendingJob,
};

/// Client handle for enqueueing jobs.
#[derive(Clone)]
pub struct QueueClient {
    pool: PgPool,
}

impl QueueClient {
    /// Creates a client over the shared connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Enqueues a job for immediate execution.
    ///
    /// Returns the job id.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the insert fails.
    pub async fn enqueue<A: JobArgs>(&self, args: &A) -> Result<i64> {
        self.enqueue_scheduled(args, Utc::now()).await
    }

    /// Enqueues a job that becomes due at `run_after`.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the insert fails.
    pub async fn enqueue_scheduled<A: JobArgs>(
        &self,
        args: &A,
        run_after: DateTime<Utc>,
    ) -> Result<i64> {
        let payload = serde_json::to_value(args)?;
        insert_job(&self.pool, A::KIND, A::QUEUE, &payload, A::MAX_ATTEMPTS, run_after).await
    }

    /// Counts jobs of a kind that are still waiting or running.
    ///
    /// Used at startup to avoid seeding a second copy of self-perpetuating
    /// periodic jobs.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn pending_count(&self, kind: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_jobs WHERE kind = $1 AND state IN ('available', 'running')",
        )
        .bind(kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Enqueues a job inside a caller-owned transaction.
    ///
    /// The job becomes visible to workers only when the transaction
    /// commits; a rollback leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the insert fails.
    pub async fn enqueue_in_tx<A: JobArgs>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        args: &A,
    ) -> Result<i64> {
        let payload = serde_json::to_value(args)?;
        insert_job(&mut **tx, A::KIND, A::QUEUE, &payload, A::MAX_ATTEMPTS, Utc::now()).await
    }
}

/// Inserts one job row through any executor.
pub(crate) async fn insert_job<'e, E>(
    executor: E,
    kind: &str,
    queue: &str,
    payload: &serde_json::Value,
    max_attempts: i32,
    run_after: DateTime<Utc>,
) -> Result<i64>
where
    E: Executor<'e, Database = Postgres>,
{
    let id = sqlx::query_scalar(
        r"
        INSERT INTO queue_jobs (kind, queue, payload, state, max_attempts, run_after)
        VALUES ($1, $2, $3, 'available', $4, $5)
        RETURNING id
        ",
    )
    .bind(kind)
    .bind(queue)
    .bind(sqlx::types::Json(payload))
    .bind(max_attempts)
    .bind(run_after)
    .fetch_one(executor)
    .await?;

    Ok(id)
}

/// Flushes jobs staged by a handler, inside the completion transaction.
pub(crate) async fn insert_staged(
    tx: &mut Transaction<'_, Postgres>,
    staged: &[PendingJob],
) -> Result<()> {
    for job in staged {
        insert_job(&mut **tx, job.kind, job.queue, &job.payload, job.max_attempts, job.run_after)
            .await?;
    }

    Ok(())
}
