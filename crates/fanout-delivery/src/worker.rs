//! The `webhook_delivery` job handler.
//!
//! Consumes delivery jobs fanned out by event processing: guards the TTL,
//! marks the row `sending`, performs the HTTP POST, classifies the outcome,
//! and translates it into a queue retry decision. Application-level retry
//! budget lives on the delivery row (`max_attempts`); the queue's own
//! attempt cap is a system-level backstop above it.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fanout_core::{
    models::DEFAULT_TIMEOUT_SECONDS, Clock, DeliveryId, DeliveryStatus, EventId, Storage,
    WebhookId,
};
use fanout_queue::{Job, JobArgs, JobContext, JobError, JobHandler};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::client::{DeliveryClient, DeliveryRequest};

/// Payload of a `webhook_delivery` job.
///
/// Carries a copy of the registration's request shape so the worker does
/// not re-read the registration row; a registration deactivated after
/// fan-out still has its scheduled delivery executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryArgs {
    /// Delivery row to drive.
    pub delivery_id: DeliveryId,
    /// Registration the delivery targets.
    pub webhook_id: WebhookId,
    /// Event being delivered.
    pub event_id: EventId,
    /// Destination URL.
    pub url: String,
    /// Registration-supplied headers.
    pub headers: HashMap<String, String>,
    /// Raw event payload.
    pub payload: String,
    /// Request timeout in seconds.
    pub timeout: i32,
    /// Retry deadline inherited from the event.
    pub expires_at: DateTime<Utc>,
    /// Namespace, carried for logging.
    pub namespace: String,
    /// Event name, carried for logging.
    pub event: String,
}

impl JobArgs for WebhookDeliveryArgs {
    const KIND: &'static str = "webhook_delivery";
    const QUEUE: &'static str = "webhooks";
}

/// Handler driving one delivery attempt per execution.
pub struct DeliveryHandler {
    storage: Storage,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
}

impl DeliveryHandler {
    /// Creates a delivery handler.
    pub fn new(storage: Storage, client: DeliveryClient, clock: Arc<dyn Clock>) -> Self {
        Self { storage, client, clock }
    }

    async fn attempt(&self, args: &WebhookDeliveryArgs) -> Result<(), JobError> {
        // TTL guard runs before anything else so an expired delivery never
        // produces another network attempt.
        if self.clock.now() > args.expires_at {
            self.storage
                .deliveries
                .update_status(args.delivery_id, DeliveryStatus::Expired, 0, "", "Delivery expired")
                .await
                .map_err(|e| JobError::retry(e.to_string()))?;

            info!(
                delivery_id = %args.delivery_id,
                webhook_id = %args.webhook_id,
                expires_at = %args.expires_at,
                "delivery expired before completion"
            );

            return Err(JobError::discard("delivery expired"));
        }

        // The sending mark does not consume an attempt. A missing or
        // already-terminal row means the registration was unregistered
        // mid-flight or another execution finished first; either way there
        // is nothing left to do.
        let marked = self
            .storage
            .deliveries
            .update_status(args.delivery_id, DeliveryStatus::Sending, 0, "", "")
            .await
            .map_err(|e| JobError::retry(e.to_string()))?;

        if marked.is_none() {
            info!(
                delivery_id = %args.delivery_id,
                webhook_id = %args.webhook_id,
                "delivery row missing or terminal, skipping"
            );
            return Ok(());
        }

        let timeout = if args.timeout > 0 { args.timeout } else { DEFAULT_TIMEOUT_SECONDS };
        let request = DeliveryRequest {
            delivery_id: args.delivery_id,
            event_id: args.event_id,
            url: args.url.clone(),
            headers: args.headers.clone(),
            payload: Bytes::from(args.payload.clone()),
            timeout: Duration::from_secs(u64::try_from(timeout).unwrap_or(30)),
        };

        match self.client.deliver(request).await {
            Ok(response) if response.is_success => {
                self.storage
                    .deliveries
                    .update_status(
                        args.delivery_id,
                        DeliveryStatus::Success,
                        i32::from(response.status_code),
                        &response.body,
                        "",
                    )
                    .await
                    .map_err(|e| JobError::retry(e.to_string()))?;

                info!(
                    delivery_id = %args.delivery_id,
                    webhook_id = %args.webhook_id,
                    namespace = %args.namespace,
                    event = %args.event,
                    status = response.status_code,
                    duration_ms = response.duration.as_millis(),
                    "webhook delivered"
                );

                Ok(())
            },
            Ok(response) => {
                let error_message = format!("HTTP {}: {}", response.status_code, response.reason);
                self.conclude_failed_attempt(
                    args,
                    i32::from(response.status_code),
                    &response.body,
                    &error_message,
                )
                .await
            },
            Err(transport_err) => {
                self.conclude_failed_attempt(args, 0, "", &transport_err.to_string()).await
            },
        }
    }

    /// Records a failed attempt and decides between retry and give-up.
    async fn conclude_failed_attempt(
        &self,
        args: &WebhookDeliveryArgs,
        response_code: i32,
        response_body: &str,
        error_message: &str,
    ) -> Result<(), JobError> {
        let snapshot = self
            .storage
            .deliveries
            .update_status(
                args.delivery_id,
                DeliveryStatus::Failed,
                response_code,
                response_body,
                error_message,
            )
            .await
            .map_err(|e| JobError::retry(e.to_string()))?;

        let Some(snapshot) = snapshot else {
            // Row vanished between the sending mark and this write.
            return Ok(());
        };

        warn!(
            delivery_id = %args.delivery_id,
            webhook_id = %args.webhook_id,
            attempt = snapshot.attempt_count,
            max_attempts = snapshot.max_attempts,
            response_code,
            error = %error_message,
            "webhook delivery attempt failed"
        );

        if snapshot.exhausted() {
            Err(JobError::discard(format!(
                "delivery attempts exhausted after {} of {}",
                snapshot.attempt_count, snapshot.max_attempts
            )))
        } else {
            Err(JobError::retry(error_message.to_string()))
        }
    }
}

#[async_trait]
impl JobHandler for DeliveryHandler {
    fn kind(&self) -> &'static str {
        WebhookDeliveryArgs::KIND
    }

    async fn execute(&self, job: &Job, _ctx: &mut JobContext) -> Result<(), JobError> {
        // A payload that never deserialized will never deserialize.
        let args: WebhookDeliveryArgs =
            job.args().map_err(|e| JobError::discard(e.to_string()))?;

        self.attempt(&args).await
    }
}
