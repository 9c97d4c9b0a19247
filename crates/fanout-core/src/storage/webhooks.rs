//! Repository for webhook registration database operations.
//!
//! Registrations are the subscription side of the fan-out pipeline: the
//! event-processing worker asks this repository which active registrations
//! match a `(namespace, event)` pair, and the public API manages their
//! lifecycle.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{WebhookId, WebhookRegistration},
};

/// Repository for webhook registration database operations.
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

    /// Inserts a new registration and returns its id.
    ///
    /// The row is stored exactly as passed; callers assign id and
    /// timestamps. Duplicate URLs are allowed, there is no uniqueness
    /// beyond the primary key.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` when the registration breaks a
    /// row-level invariant (empty namespace, empty event set, empty URL),
    /// or a database error if the insert fails.
    pub async fn create(&self, registration: &WebhookRegistration) -> Result<WebhookId> {
        if registration.namespace.is_empty() {
            return Err(CoreError::invalid("namespace must not be empty"));
        }
        if registration.events.0.is_empty() {
            return Err(CoreError::invalid("events must not be empty"));
        }
        if registration.url.is_empty() {
            return Err(CoreError::invalid("url must not be empty"));
        }

        let id = sqlx::query_scalar(
            r"
            INSERT INTO webhook_registrations (
                id, namespace, events, url, headers, timeout,
                active, description, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
            )
            RETURNING id
            ",
        )
        .bind(registration.id)
        .bind(&registration.namespace)
        .bind(&registration.events)
        .bind(&registration.url)
        .bind(&registration.headers)
        .bind(registration.timeout_seconds)
        .bind(registration.active)
        .bind(&registration.description)
        .bind(registration.created_at)
        .bind(registration.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(WebhookId(id))
    }

    /// Deletes a registration.
    ///
    /// Idempotent: deleting a missing id is not an error. The schema
    /// cascades the delete to any in-flight delivery rows.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, webhook_id: WebhookId) -> Result<()> {
        sqlx::query("DELETE FROM webhook_registrations WHERE id = $1")
            .bind(webhook_id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    /// Finds a registration by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, webhook_id: WebhookId) -> Result<Option<WebhookRegistration>> {
        let registration = sqlx::query_as::<_, WebhookRegistration>(
            r"
            SELECT id, namespace, events, url, headers, timeout,
                   active, description, created_at, updated_at
            FROM webhook_registrations
            WHERE id = $1
            ",
        )
        .bind(webhook_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(registration)
    }

    /// Returns every active registration subscribed to `event` in
    /// `namespace`.
    ///
    /// This is the fan-out membership query. The jsonb `?` containment
    /// predicate is served by the partial GIN index on `events`. The result
    /// is a snapshot at call time; registrations added afterwards are not
    /// reflected.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_by_event(
        &self,
        namespace: &str,
        event: &str,
    ) -> Result<Vec<WebhookRegistration>> {
        let registrations = sqlx::query_as::<_, WebhookRegistration>(
            r"
            SELECT id, namespace, events, url, headers, timeout,
                   active, description, created_at, updated_at
            FROM webhook_registrations
            WHERE namespace = $1 AND active = true AND events ? $2
            ",
        )
        .bind(namespace)
        .bind(event)
        .fetch_all(&*self.pool)
        .await?;

        Ok(registrations)
    }

    /// Lists registrations for a namespace, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_by_namespace(
        &self,
        namespace: &str,
        active_only: bool,
    ) -> Result<Vec<WebhookRegistration>> {
        let registrations = sqlx::query_as::<_, WebhookRegistration>(
            r"
            SELECT id, namespace, events, url, headers, timeout,
                   active, description, created_at, updated_at
            FROM webhook_registrations
            WHERE namespace = $1 AND (NOT $2 OR active = true)
            ORDER BY created_at DESC
            ",
        )
        .bind(namespace)
        .bind(active_only)
        .fetch_all(&*self.pool)
        .await?;

        Ok(registrations)
    }

    /// Enables or disables a registration.
    ///
    /// Disabled registrations keep their configuration and existing
    /// deliveries but are skipped by subsequent fan-outs.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` when the id does not exist.
    pub async fn set_active(&self, webhook_id: WebhookId, active: bool) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE webhook_registrations
            SET active = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(webhook_id)
        .bind(active)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("webhook {webhook_id} not found")));
        }

        Ok(())
    }
}
