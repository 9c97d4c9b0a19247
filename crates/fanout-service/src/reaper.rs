//! Periodic reaping of expired event rows.
//!
//! Event rows past `expires_at` are dead weight: every delivery referencing
//! them is terminal by definition. A self-perpetuating job on the `default`
//! queue deletes them and schedules its own next run.

use async_trait::async_trait;
use chrono::Utc;
use fanout_core::Storage;
use fanout_queue::{Job, JobArgs, JobContext, JobError, JobHandler};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Interval between reaper runs, in seconds.
pub const REAP_INTERVAL_SECONDS: i64 = 3600;

/// Payload of an `event_reaper` job. Carries no data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventReaperArgs {}

impl JobArgs for EventReaperArgs {
    const KIND: &'static str = "event_reaper";
}

/// Handler deleting expired event rows and rescheduling itself.
pub struct EventReaperHandler {
    storage: Storage,
}

impl EventReaperHandler {
    /// Creates a reaper handler.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl JobHandler for EventReaperHandler {
    fn kind(&self) -> &'static str {
        EventReaperArgs::KIND
    }

    async fn execute(&self, _job: &Job, ctx: &mut JobContext) -> Result<(), JobError> {
        let removed = self
            .storage
            .events
            .delete_expired(Utc::now())
            .await
            .map_err(|e| JobError::retry(e.to_string()))?;

        if removed > 0 {
            info!(removed, "reaped expired event records");
        }

        // The next run rides on this job's completion transaction, so the
        // chain survives crashes without ever forking.
        ctx.enqueue_scheduled(
            &EventReaperArgs {},
            Utc::now() + chrono::Duration::seconds(REAP_INTERVAL_SECONDS),
        )
        .map_err(|e| JobError::retry(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaper_runs_on_the_default_queue() {
        assert_eq!(EventReaperArgs::KIND, "event_reaper");
        assert_eq!(EventReaperArgs::QUEUE, fanout_queue::DEFAULT_QUEUE);
    }
}
