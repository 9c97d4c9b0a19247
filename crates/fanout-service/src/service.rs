//! The in-process service facade used by front-end adapters.
//!
//! Validation happens here, before anything touches the store or the queue:
//! a failing call returns synchronously and leaves no trace. A successful
//! `push_event` only proves the event job was enqueued; delivery outcomes
//! surface later through `webhook_status`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fanout_core::{
    models::{DEFAULT_TIMEOUT_SECONDS, DEFAULT_TTL_SECONDS, MAX_TIMEOUT_SECONDS},
    CoreError, Delivery, EventId, Result, Storage, WebhookId, WebhookRegistration,
};
use fanout_queue::QueueClient;
use tracing::info;

use crate::event_worker::EventProcessingArgs;

/// Input for registering a webhook.
#[derive(Debug, Clone)]
pub struct NewWebhook {
    /// Namespace the subscription is scoped to.
    pub namespace: String,
    /// Event names to subscribe to. Duplicates collapse.
    pub events: Vec<String>,
    /// Destination URL.
    pub url: String,
    /// Request headers to send with each delivery.
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds; values ≤ 0 take the default.
    pub timeout_seconds: i32,
    /// Whether the registration starts active. Unspecified means active.
    pub active: Option<bool>,
    /// Free-text description.
    pub description: String,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct RegisteredWebhook {
    /// Assigned registration id.
    pub webhook_id: WebhookId,
    /// Timestamp assigned to the stored row.
    pub created_at: DateTime<Utc>,
}

/// Result of a successful event publication.
///
/// `webhooks_triggered` is the membership sampled at push time; the worker
/// re-samples when it fans out, so a registration created in between will
/// also be targeted. The count is an advisory lower bound.
#[derive(Debug, Clone)]
pub struct PushedEvent {
    /// Identifier assigned to the event.
    pub event_id: EventId,
    /// Number of registrations matching at push time.
    pub webhooks_triggered: usize,
    /// Ids of those registrations.
    pub webhook_ids: Vec<WebhookId>,
}

/// Identifier accepted by [`WebhookService::webhook_status`].
///
/// Exactly one of the two id kinds; the type makes passing both or
/// neither unrepresentable.
#[derive(Debug, Clone, Copy)]
pub enum StatusSelector {
    /// All deliveries targeting one registration.
    Webhook(WebhookId),
    /// All deliveries fanned out for one event.
    Event(EventId),
}

/// In-process facade over the store and the job queue.
#[derive(Clone)]
pub struct WebhookService {
    storage: Storage,
    queue: QueueClient,
}

impl WebhookService {
    /// Creates the service over shared store and queue handles.
    pub fn new(storage: Storage, queue: QueueClient) -> Self {
        Self { storage, queue }
    }

    /// Registers a webhook subscription.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for an empty namespace, an empty
    /// event list, any empty event name, an empty URL, or a timeout above
    /// the enforced ceiling.
    pub async fn register_webhook(&self, new: NewWebhook) -> Result<RegisteredWebhook> {
        if new.namespace.is_empty() {
            return Err(CoreError::invalid("namespace is required"));
        }
        if new.events.is_empty() {
            return Err(CoreError::invalid("at least one event is required"));
        }
        if new.events.iter().any(String::is_empty) {
            return Err(CoreError::invalid("event names cannot be empty"));
        }
        if new.url.is_empty() {
            return Err(CoreError::invalid("url is required"));
        }
        if new.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(CoreError::invalid(format!(
                "timeout_seconds must not exceed {MAX_TIMEOUT_SECONDS}"
            )));
        }

        let timeout_seconds =
            if new.timeout_seconds <= 0 { DEFAULT_TIMEOUT_SECONDS } else { new.timeout_seconds };

        let now = Utc::now();
        let registration = WebhookRegistration {
            id: WebhookId::new(),
            namespace: new.namespace,
            events: sqlx::types::Json(dedup_events(new.events)),
            url: new.url,
            headers: sqlx::types::Json(new.headers),
            timeout_seconds,
            active: new.active.unwrap_or(true),
            description: new.description,
            created_at: now,
            updated_at: now,
        };

        let webhook_id = self.storage.webhooks.create(&registration).await?;

        info!(
            webhook_id = %webhook_id,
            namespace = %registration.namespace,
            events = ?registration.events.0,
            url = %registration.url,
            "webhook registered"
        );

        Ok(RegisteredWebhook { webhook_id, created_at: registration.created_at })
    }

    /// Removes a webhook subscription.
    ///
    /// Idempotent: unknown ids succeed. The schema cascades the delete to
    /// any in-flight delivery rows; the delivery worker treats the missing
    /// rows as settled.
    ///
    /// # Errors
    ///
    /// Returns error only on store failure.
    pub async fn unregister_webhook(&self, webhook_id: WebhookId) -> Result<()> {
        self.storage.webhooks.delete(webhook_id).await?;

        info!(webhook_id = %webhook_id, "webhook unregistered");

        Ok(())
    }

    /// Publishes an event for asynchronous fan-out.
    ///
    /// Validates the payload as JSON (syntax only), samples the matching
    /// registrations for the response, and enqueues the event-processing
    /// job. Nothing is persisted if any step fails.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for an empty namespace or event
    /// name, or a payload that is not valid JSON; `CoreError::Database`
    /// when the membership query or the enqueue fails.
    pub async fn push_event(
        &self,
        namespace: &str,
        event: &str,
        payload: &str,
        ttl_seconds: i64,
        metadata: HashMap<String, String>,
    ) -> Result<PushedEvent> {
        if namespace.is_empty() {
            return Err(CoreError::invalid("namespace is required"));
        }
        if event.is_empty() {
            return Err(CoreError::invalid("event is required"));
        }
        if !payload.is_empty() {
            if let Err(e) = serde_json::from_str::<serde_json::Value>(payload) {
                return Err(CoreError::invalid(format!("invalid JSON payload: {e}")));
            }
        }

        let ttl_seconds = if ttl_seconds <= 0 { DEFAULT_TTL_SECONDS } else { ttl_seconds };
        let event_id = EventId::new();

        let matching = self.storage.webhooks.find_active_by_event(namespace, event).await?;
        let webhook_ids: Vec<WebhookId> = matching.iter().map(|w| w.id).collect();

        let args = EventProcessingArgs {
            event_id,
            namespace: namespace.to_string(),
            event: event.to_string(),
            payload: payload.to_string(),
            ttl_seconds,
            metadata,
            created_at: Utc::now(),
        };

        self.queue.enqueue(&args).await.map_err(|e| CoreError::Database(e.to_string()))?;

        info!(
            event_id = %event_id,
            namespace,
            event,
            webhooks_triggered = webhook_ids.len(),
            "event scheduled for processing"
        );

        Ok(PushedEvent { event_id, webhooks_triggered: webhook_ids.len(), webhook_ids })
    }

    /// Returns the delivery rows for a registration or an event.
    ///
    /// An unknown id yields an empty list rather than an error.
    ///
    /// # Errors
    ///
    /// Returns error only on store failure.
    pub async fn webhook_status(&self, selector: StatusSelector) -> Result<Vec<Delivery>> {
        match selector {
            StatusSelector::Webhook(webhook_id) => {
                self.storage.deliveries.find_by_webhook(webhook_id).await
            },
            StatusSelector::Event(event_id) => {
                self.storage.deliveries.find_by_event(event_id).await
            },
        }
    }

    /// Lists registrations in a namespace, newest first.
    ///
    /// With `event_filter` set, only registrations subscribed to that exact
    /// event name are returned.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` for an empty namespace.
    pub async fn list_webhooks(
        &self,
        namespace: &str,
        active_only: bool,
        event_filter: Option<&str>,
    ) -> Result<Vec<WebhookRegistration>> {
        if namespace.is_empty() {
            return Err(CoreError::invalid("namespace is required"));
        }

        let mut registrations =
            self.storage.webhooks.list_by_namespace(namespace, active_only).await?;

        if let Some(event) = event_filter.filter(|e| !e.is_empty()) {
            registrations.retain(|r| r.subscribes_to(event));
        }

        Ok(registrations)
    }
}

/// Collapses duplicate event names, preserving first-seen order.
fn dedup_events(events: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    events.into_iter().filter(|e| seen.insert(e.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_service() -> WebhookService {
        // connect_lazy opens no connection; validation failures return
        // before the pool is ever touched.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        WebhookService::new(Storage::new(pool.clone()), QueueClient::new(pool))
    }

    fn valid_new_webhook() -> NewWebhook {
        NewWebhook {
            namespace: "user".into(),
            events: vec!["signup".into()],
            url: "http://receiver/hook".into(),
            headers: HashMap::new(),
            timeout_seconds: 0,
            active: None,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn register_rejects_empty_namespace() {
        let service = lazy_service();
        let new = NewWebhook { namespace: String::new(), ..valid_new_webhook() };

        let err = service.register_webhook(new).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn register_rejects_empty_event_list() {
        let service = lazy_service();
        let new = NewWebhook { events: vec![], ..valid_new_webhook() };

        let err = service.register_webhook(new).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn register_rejects_blank_event_name() {
        let service = lazy_service();
        let new = NewWebhook { events: vec!["signup".into(), String::new()], ..valid_new_webhook() };

        let err = service.register_webhook(new).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn register_rejects_empty_url() {
        let service = lazy_service();
        let new = NewWebhook { url: String::new(), ..valid_new_webhook() };

        let err = service.register_webhook(new).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn register_rejects_timeout_above_ceiling() {
        let service = lazy_service();
        let new = NewWebhook { timeout_seconds: MAX_TIMEOUT_SECONDS + 1, ..valid_new_webhook() };

        let err = service.register_webhook(new).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn push_event_rejects_missing_scope() {
        let service = lazy_service();

        let err = service.push_event("", "signup", "{}", 3600, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = service.push_event("user", "", "{}", 3600, HashMap::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn push_event_rejects_malformed_json() {
        let service = lazy_service();

        let err = service
            .push_event("user", "signup", "{not json", 3600, HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn list_webhooks_rejects_empty_namespace() {
        let service = lazy_service();

        let err = service.list_webhooks("", false, None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        let events = vec![
            "signup".to_string(),
            "login".to_string(),
            "signup".to_string(),
            "logout".to_string(),
            "login".to_string(),
        ];

        assert_eq!(dedup_events(events), vec!["signup", "login", "logout"]);
    }
}
