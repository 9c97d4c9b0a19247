//! Idempotent schema setup for the domain tables.
//!
//! The binary applies this at startup; integration tests reuse it so the
//! tables they exercise are exactly the ones production runs on.

use sqlx::PgPool;

use crate::error::Result;

/// Creates the registration, event, and delivery tables with their indexes.
///
/// Every statement is `IF NOT EXISTS`; running this against an existing
/// schema is a no-op.
///
/// # Errors
///
/// Returns error if any DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_registrations (
            id UUID PRIMARY KEY,
            namespace TEXT NOT NULL,
            events JSONB NOT NULL,
            url TEXT NOT NULL,
            headers JSONB NOT NULL DEFAULT '{}'::jsonb,
            timeout INTEGER NOT NULL DEFAULT 30,
            active BOOLEAN NOT NULL DEFAULT true,
            description TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_records (
            id UUID PRIMARY KEY,
            namespace TEXT NOT NULL,
            event TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '',
            ttl BIGINT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_deliveries (
            id UUID PRIMARY KEY,
            webhook_id UUID NOT NULL REFERENCES webhook_registrations(id) ON DELETE CASCADE,
            event_id UUID NOT NULL REFERENCES event_records(id) ON DELETE CASCADE,
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            last_attempted_at TIMESTAMPTZ,
            next_retry_at TIMESTAMPTZ,
            expires_at TIMESTAMPTZ NOT NULL,
            response_code INTEGER NOT NULL DEFAULT 0,
            response_body TEXT NOT NULL DEFAULT '',
            error_message TEXT NOT NULL DEFAULT '',
            UNIQUE (webhook_id, event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        r"CREATE INDEX IF NOT EXISTS idx_registrations_namespace
          ON webhook_registrations(namespace) WHERE active",
        r"CREATE INDEX IF NOT EXISTS idx_registrations_events
          ON webhook_registrations USING GIN (events) WHERE active",
        r"CREATE INDEX IF NOT EXISTS idx_event_records_scope
          ON event_records(namespace, event)",
        r"CREATE INDEX IF NOT EXISTS idx_event_records_expiry
          ON event_records(expires_at)",
        r"CREATE INDEX IF NOT EXISTS idx_deliveries_webhook
          ON webhook_deliveries(webhook_id, created_at DESC)",
        r"CREATE INDEX IF NOT EXISTS idx_deliveries_event
          ON webhook_deliveries(event_id, created_at DESC)",
        r"CREATE INDEX IF NOT EXISTS idx_deliveries_status
          ON webhook_deliveries(status)",
        r"CREATE INDEX IF NOT EXISTS idx_deliveries_expiry
          ON webhook_deliveries(expires_at)",
    ];

    for statement in indexes {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
