//! Database access layer implementing the repository pattern for webhook
//! persistence.
//!
//! Repositories translate between domain models and the PostgreSQL schema.
//! All database operations go through this module; direct SQL elsewhere is
//! forbidden to keep access patterns auditable.

use std::sync::Arc;

use sqlx::PgPool;

pub mod deliveries;
pub mod events;
pub mod schema;
pub mod webhooks;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
///
/// Owns a shared connection pool; repositories borrow it through `Arc` so the
/// public API and every worker pool draw from the same connections.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook registrations.
    pub webhooks: Arc<webhooks::Repository>,

    /// Repository for published event records.
    pub events: Arc<events::Repository>,

    /// Repository for delivery rows.
    pub deliveries: Arc<deliveries::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            webhooks: Arc::new(webhooks::Repository::new(pool.clone())),
            events: Arc::new(events::Repository::new(pool.clone())),
            deliveries: Arc::new(deliveries::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.webhooks.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Instantiation only; database behavior is covered by integration
        // tests.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
