//! Idempotent schema setup for the job table.

use sqlx::PgPool;

use crate::error::Result;

/// Creates the `queue_jobs` table and its claim index.
///
/// # Errors
///
/// Returns error if any DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_jobs (
            id BIGSERIAL PRIMARY KEY,
            kind TEXT NOT NULL,
            queue TEXT NOT NULL DEFAULT 'default',
            payload JSONB NOT NULL,
            state TEXT NOT NULL DEFAULT 'available',
            attempt INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 25,
            run_after TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            claimed_at TIMESTAMPTZ,
            last_error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"CREATE INDEX IF NOT EXISTS idx_queue_jobs_claim
          ON queue_jobs(queue, state, run_after)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
