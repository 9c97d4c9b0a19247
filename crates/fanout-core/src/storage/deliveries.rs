//! Repository for delivery row database operations.
//!
//! Delivery rows are the operator-visible record of the fan-out pipeline:
//! one row per `(webhook, event)` pair, updated in place as the delivery
//! worker drives attempts. Status writes go through [`Repository::update_status`],
//! which enforces terminal finality and owns the attempt accounting.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Delivery, DeliveryId, DeliveryStatus, EventId, WebhookId},
};

/// Attempt counters of a delivery row after a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSnapshot {
    /// Concluded attempts recorded on the row.
    pub attempt_count: i32,
    /// Application-level attempt budget.
    pub max_attempts: i32,
}

impl AttemptSnapshot {
    /// Returns true once the attempt budget is used up.
    pub const fn exhausted(self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

/// Repository for delivery row database operations.
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

    /// Inserts a pending delivery row, or returns the existing one.
    ///
    /// Delivery rows are unique per `(webhook_id, event_id)`; when the
    /// event-processing job is re-run after a crash the conflict path hands
    /// back the id created by the earlier run, keeping fan-out idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or the conflict lookup fails.
    pub async fn create_or_get(&self, delivery: &Delivery) -> Result<DeliveryId> {
        let inserted: Option<DeliveryId> = sqlx::query_scalar(
            r"
            INSERT INTO webhook_deliveries (
                id, webhook_id, event_id, status, attempt_count, max_attempts,
                created_at, expires_at, response_code, response_body, error_message
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
            )
            ON CONFLICT (webhook_id, event_id) DO NOTHING
            RETURNING id
            ",
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(delivery.event_id)
        .bind(delivery.status)
        .bind(delivery.attempt_count)
        .bind(delivery.max_attempts)
        .bind(delivery.created_at)
        .bind(delivery.expires_at)
        .bind(delivery.response_code)
        .bind(&delivery.response_body)
        .bind(&delivery.error_message)
        .fetch_optional(&*self.pool)
        .await?;

        if let Some(id) = inserted {
            return Ok(id);
        }

        let existing: DeliveryId = sqlx::query_scalar(
            "SELECT id FROM webhook_deliveries WHERE webhook_id = $1 AND event_id = $2",
        )
        .bind(delivery.webhook_id)
        .bind(delivery.event_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(existing)
    }

    /// Writes a status transition on a delivery row.
    ///
    /// Stamps `last_attempted_at` and records the response fields. The
    /// attempt counter advances only for statuses that conclude a dispatch
    /// attempt (`success`, `failed`, `retrying`); the `sending` mark and
    /// the expiry guard leave it untouched. Rows already in a terminal
    /// status (`success`, `expired`) are never modified.
    ///
    /// Returns the row's counters after the write, or `None` when the row
    /// is missing or terminal. Callers treat `None` as "nothing left to
    /// do": the registration was deleted mid-flight or another worker
    /// already finished the delivery.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update_status(
        &self,
        delivery_id: DeliveryId,
        status: DeliveryStatus,
        response_code: i32,
        response_body: &str,
        error_message: &str,
    ) -> Result<Option<AttemptSnapshot>> {
        let row: Option<(i32, i32)> = sqlx::query_as(
            r"
            UPDATE webhook_deliveries
            SET status = $2,
                last_attempted_at = $3,
                response_code = $4,
                response_body = $5,
                error_message = $6,
                attempt_count = attempt_count + CASE WHEN $7 THEN 1 ELSE 0 END
            WHERE id = $1 AND status NOT IN ('success', 'expired')
            RETURNING attempt_count, max_attempts
            ",
        )
        .bind(delivery_id)
        .bind(status)
        .bind(Utc::now())
        .bind(response_code)
        .bind(response_body)
        .bind(error_message)
        .bind(status.concludes_attempt())
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(attempt_count, max_attempts)| AttemptSnapshot { attempt_count, max_attempts }))
    }

    /// Finds a delivery row by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, delivery_id: DeliveryId) -> Result<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, webhook_id, event_id, status, attempt_count, max_attempts,
                   created_at, last_attempted_at, next_retry_at, expires_at,
                   response_code, response_body, error_message
            FROM webhook_deliveries
            WHERE id = $1
            ",
        )
        .bind(delivery_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(delivery)
    }

    /// Returns deliveries targeting a registration, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_webhook(&self, webhook_id: WebhookId) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, webhook_id, event_id, status, attempt_count, max_attempts,
                   created_at, last_attempted_at, next_retry_at, expires_at,
                   response_code, response_body, error_message
            FROM webhook_deliveries
            WHERE webhook_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(webhook_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }

    /// Returns deliveries fanned out for an event, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_event(&self, event_id: EventId) -> Result<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, webhook_id, event_id, status, attempt_count, max_attempts,
                   created_at, last_attempted_at, next_retry_at, expires_at,
                   response_code, response_body, error_message
            FROM webhook_deliveries
            WHERE event_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(deliveries)
    }
}
