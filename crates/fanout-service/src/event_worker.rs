//! The `event_processing` job handler.
//!
//! Expands one published event into its fan-out: the event row is written
//! first, then one pending delivery row and one staged `webhook_delivery`
//! job per matching active registration. Every step is idempotent by key
//! (event id, `(webhook_id, event_id)`), so a queue redelivery of the same
//! event job converges instead of duplicating work.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fanout_core::{models::Delivery, EventId, EventRecord, Storage};
use fanout_delivery::WebhookDeliveryArgs;
use fanout_queue::{Job, JobArgs, JobContext, JobError, JobHandler};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Payload of an `event_processing` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventProcessingArgs {
    /// Identifier assigned at push time; the event row's natural key.
    pub event_id: EventId,
    /// Namespace the event was published under.
    pub namespace: String,
    /// Event name.
    pub event: String,
    /// Opaque JSON payload.
    pub payload: String,
    /// Time-to-live in seconds.
    pub ttl_seconds: i64,
    /// Caller-supplied metadata.
    pub metadata: HashMap<String, String>,
    /// When the event was pushed; expiry is measured from here.
    pub created_at: DateTime<Utc>,
}

impl JobArgs for EventProcessingArgs {
    const KIND: &'static str = "event_processing";
    const QUEUE: &'static str = "events";
}

/// Handler materializing events and fanning out deliveries.
pub struct EventProcessingHandler {
    storage: Storage,
}

impl EventProcessingHandler {
    /// Creates an event-processing handler.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn fan_out(&self, args: &EventProcessingArgs, ctx: &mut JobContext) -> Result<(), JobError> {
        let record = EventRecord::new(
            args.event_id,
            args.namespace.clone(),
            args.event.clone(),
            args.payload.clone(),
            args.ttl_seconds,
            args.metadata.clone(),
            args.created_at,
        );

        let inserted = self
            .storage
            .events
            .insert_if_absent(&record)
            .await
            .map_err(|e| JobError::retry(e.to_string()))?;

        if !inserted {
            info!(event_id = %args.event_id, "event already stored, re-running fan-out");
        }

        let matching = self
            .storage
            .webhooks
            .find_active_by_event(&args.namespace, &args.event)
            .await
            .map_err(|e| JobError::retry(e.to_string()))?;

        if matching.is_empty() {
            info!(
                event_id = %args.event_id,
                namespace = %args.namespace,
                event = %args.event,
                "no webhooks registered for event"
            );
            return Ok(());
        }

        let mut scheduled = 0usize;
        for webhook in &matching {
            let delivery =
                Delivery::pending(webhook.id, args.event_id, record.expires_at, Utc::now());

            // Per-row failures are logged and skipped; the unique
            // (webhook_id, event_id) key means a later re-run can still
            // converge the missing rows.
            let delivery_id = match self.storage.deliveries.create_or_get(&delivery).await {
                Ok(id) => id,
                Err(e) => {
                    error!(
                        event_id = %args.event_id,
                        webhook_id = %webhook.id,
                        error = %e,
                        "failed to create delivery row"
                    );
                    continue;
                },
            };

            ctx.enqueue(&WebhookDeliveryArgs {
                delivery_id,
                webhook_id: webhook.id,
                event_id: args.event_id,
                url: webhook.url.clone(),
                headers: webhook.headers().clone(),
                payload: args.payload.clone(),
                timeout: webhook.timeout_seconds,
                expires_at: record.expires_at,
                namespace: args.namespace.clone(),
                event: args.event.clone(),
            })
            .map_err(|e| JobError::retry(e.to_string()))?;

            scheduled += 1;
        }

        info!(
            event_id = %args.event_id,
            namespace = %args.namespace,
            event = %args.event,
            matched = matching.len(),
            scheduled,
            "event fan-out completed"
        );

        Ok(())
    }
}

#[async_trait]
impl JobHandler for EventProcessingHandler {
    fn kind(&self) -> &'static str {
        EventProcessingArgs::KIND
    }

    async fn execute(&self, job: &Job, ctx: &mut JobContext) -> Result<(), JobError> {
        let args: EventProcessingArgs =
            job.args().map_err(|e| JobError::discard(e.to_string()))?;

        self.fan_out(&args, ctx).await
    }
}
