//! Repository for published event records.
//!
//! Event rows are written once by the event-processing worker and never
//! mutated. The insert is keyed by the event id generated at `PushEvent`
//! time, so a queue redelivery of the same event job lands on the conflict
//! path instead of duplicating the row.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{EventId, EventRecord},
};

/// Repository for event record database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts an event record unless one with the same id already exists.
    ///
    /// Returns `true` when the row was written by this call, `false` when
    /// the id was already present. The latter means the event job is being
    /// re-run and downstream steps should proceed on their own idempotency.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails for reasons other than the id
    /// conflict.
    pub async fn insert_if_absent(&self, event: &EventRecord) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO event_records (
                id, namespace, event, payload, ttl, metadata,
                created_at, expires_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(event.id)
        .bind(&event.namespace)
        .bind(&event.event)
        .bind(&event.payload)
        .bind(event.ttl_seconds)
        .bind(&event.metadata)
        .bind(event.created_at)
        .bind(event.expires_at)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Finds an event record by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, event_id: EventId) -> Result<Option<EventRecord>> {
        let event = sqlx::query_as::<_, EventRecord>(
            r"
            SELECT id, namespace, event, payload, ttl, metadata,
                   created_at, expires_at
            FROM event_records
            WHERE id = $1
            ",
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
    }

    /// Deletes event rows whose TTL elapsed before `now`.
    ///
    /// Deliveries referencing a reaped event cascade away with it; by then
    /// they are terminal. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM event_records WHERE expires_at < $1")
            .bind(now)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
