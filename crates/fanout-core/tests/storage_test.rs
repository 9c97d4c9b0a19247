//! Integration tests for the storage repositories.
//!
//! These need a reachable PostgreSQL (`DATABASE_URL`); run them with
//! `cargo test -- --ignored`.

mod support;

use fanout_core::{
    models::{Delivery, DeliveryStatus},
    CoreError, Storage,
};
use support::{event, registration, test_pool, unique_namespace};

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn active_filter_and_exact_event_match() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let active = registration(&ns, &["signup", "login"], "http://receiver/a");
    let mut inactive = registration(&ns, &["signup"], "http://receiver/b");
    inactive.active = false;

    storage.webhooks.create(&active).await.unwrap();
    storage.webhooks.create(&inactive).await.unwrap();

    let matched = storage.webhooks.find_active_by_event(&ns, "signup").await.unwrap();
    assert_eq!(matched.len(), 1, "inactive registrations must never match");
    assert_eq!(matched[0].id, active.id);

    // Exact-equal matching, no prefixes or patterns.
    assert!(storage.webhooks.find_active_by_event(&ns, "sign").await.unwrap().is_empty());
    assert!(storage.webhooks.find_active_by_event(&ns, "signup2").await.unwrap().is_empty());

    // Other namespaces are invisible.
    let other_ns = unique_namespace("other");
    assert!(storage.webhooks.find_active_by_event(&other_ns, "signup").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn store_rejects_invalid_registrations() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let mut no_namespace = registration(&ns, &["signup"], "http://receiver/a");
    no_namespace.namespace = String::new();
    assert!(matches!(
        storage.webhooks.create(&no_namespace).await.unwrap_err(),
        CoreError::InvalidInput(_)
    ));

    let no_events = registration(&ns, &[], "http://receiver/a");
    assert!(matches!(
        storage.webhooks.create(&no_events).await.unwrap_err(),
        CoreError::InvalidInput(_)
    ));

    let mut no_url = registration(&ns, &["signup"], "http://receiver/a");
    no_url.url = String::new();
    assert!(matches!(
        storage.webhooks.create(&no_url).await.unwrap_err(),
        CoreError::InvalidInput(_)
    ));

    // Nothing was written.
    assert!(storage.webhooks.list_by_namespace(&ns, false).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn list_orders_newest_first_and_filters_active() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("order");

    let mut older = registration(&ns, &["created"], "http://receiver/old");
    older.created_at = older.created_at - chrono::Duration::seconds(60);
    let newer = registration(&ns, &["created"], "http://receiver/new");
    let mut disabled = registration(&ns, &["created"], "http://receiver/off");
    disabled.active = false;

    storage.webhooks.create(&older).await.unwrap();
    storage.webhooks.create(&newer).await.unwrap();
    storage.webhooks.create(&disabled).await.unwrap();

    let all = storage.webhooks.list_by_namespace(&ns, false).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[0].created_at >= all[1].created_at);
    assert!(all[1].created_at >= all[2].created_at);

    let active_only = storage.webhooks.list_by_namespace(&ns, true).await.unwrap();
    assert_eq!(active_only.len(), 2);
    assert!(active_only.iter().all(|r| r.active));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn unregister_is_idempotent_and_cascades() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let reg = registration(&ns, &["signup"], "http://receiver/a");
    storage.webhooks.create(&reg).await.unwrap();

    let evt = event(&ns, "signup");
    storage.events.insert_if_absent(&evt).await.unwrap();

    let delivery = Delivery::pending(reg.id, evt.id, evt.expires_at, chrono::Utc::now());
    let delivery_id = storage.deliveries.create_or_get(&delivery).await.unwrap();

    storage.webhooks.delete(reg.id).await.unwrap();
    // Second delete of the same id succeeds.
    storage.webhooks.delete(reg.id).await.unwrap();

    // The delivery row cascaded away with its registration.
    assert!(storage.deliveries.find_by_id(delivery_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn set_active_bumps_updated_at() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let reg = registration(&ns, &["signup"], "http://receiver/a");
    storage.webhooks.create(&reg).await.unwrap();

    storage.webhooks.set_active(reg.id, false).await.unwrap();

    let stored = storage.webhooks.find_by_id(reg.id).await.unwrap().unwrap();
    assert!(!stored.active);
    assert!(stored.updated_at > reg.updated_at);

    let missing = fanout_core::WebhookId::new();
    assert!(matches!(
        storage.webhooks.set_active(missing, true).await.unwrap_err(),
        CoreError::NotFound(_)
    ));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn event_insert_is_idempotent_by_id() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let evt = event(&ns, "signup");
    assert!(storage.events.insert_if_absent(&evt).await.unwrap());
    assert!(!storage.events.insert_if_absent(&evt).await.unwrap());

    let stored = storage.events.find_by_id(evt.id).await.unwrap().unwrap();
    assert_eq!(stored.payload, evt.payload);
    assert_eq!(stored.expires_at, stored.created_at + chrono::Duration::seconds(3600));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn delivery_rows_are_unique_per_webhook_event_pair() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("order");

    let reg = registration(&ns, &["created"], "http://receiver/a");
    storage.webhooks.create(&reg).await.unwrap();
    let evt = event(&ns, "created");
    storage.events.insert_if_absent(&evt).await.unwrap();

    let first = Delivery::pending(reg.id, evt.id, evt.expires_at, chrono::Utc::now());
    let second = Delivery::pending(reg.id, evt.id, evt.expires_at, chrono::Utc::now());

    let first_id = storage.deliveries.create_or_get(&first).await.unwrap();
    let second_id = storage.deliveries.create_or_get(&second).await.unwrap();

    // Re-running fan-out converges on the row the first run created.
    assert_eq!(first_id, second_id);
    assert_eq!(storage.deliveries.find_by_event(evt.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn attempt_accounting_and_terminal_finality() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let reg = registration(&ns, &["signup"], "http://receiver/a");
    storage.webhooks.create(&reg).await.unwrap();
    let evt = event(&ns, "signup");
    storage.events.insert_if_absent(&evt).await.unwrap();

    let delivery = Delivery::pending(reg.id, evt.id, evt.expires_at, chrono::Utc::now());
    let id = storage.deliveries.create_or_get(&delivery).await.unwrap();

    // The sending mark does not consume an attempt.
    let snap = storage
        .deliveries
        .update_status(id, DeliveryStatus::Sending, 0, "", "")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snap.attempt_count, 0);

    // A concluded failed attempt does.
    let snap = storage
        .deliveries
        .update_status(id, DeliveryStatus::Failed, 500, "boom", "HTTP 500: Internal Server Error")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snap.attempt_count, 1);

    // Second attempt succeeds.
    storage.deliveries.update_status(id, DeliveryStatus::Sending, 0, "", "").await.unwrap();
    let snap = storage
        .deliveries
        .update_status(id, DeliveryStatus::Success, 200, "thanks", "")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snap.attempt_count, 2);

    // Terminal rows accept no further writes.
    let refused = storage
        .deliveries
        .update_status(id, DeliveryStatus::Failed, 503, "", "late write")
        .await
        .unwrap();
    assert!(refused.is_none());

    let row = storage.deliveries.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.status, DeliveryStatus::Success);
    assert_eq!(row.attempt_count, 2);
    assert_eq!(row.response_code, 200);
    assert_eq!(row.response_body, "thanks");
    assert_eq!(row.error_message, "");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn expiry_write_records_no_attempt() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let reg = registration(&ns, &["signup"], "http://receiver/a");
    storage.webhooks.create(&reg).await.unwrap();
    let evt = event(&ns, "signup");
    storage.events.insert_if_absent(&evt).await.unwrap();

    let delivery = Delivery::pending(reg.id, evt.id, evt.expires_at, chrono::Utc::now());
    let id = storage.deliveries.create_or_get(&delivery).await.unwrap();

    // One real failed attempt, then the expiry guard fires.
    storage.deliveries.update_status(id, DeliveryStatus::Sending, 0, "", "").await.unwrap();
    storage
        .deliveries
        .update_status(id, DeliveryStatus::Failed, 500, "", "HTTP 500: Internal Server Error")
        .await
        .unwrap();

    let snap = storage
        .deliveries
        .update_status(id, DeliveryStatus::Expired, 0, "", "Delivery expired")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snap.attempt_count, 1, "expiry is not an attempt");

    // Expired is terminal.
    let refused =
        storage.deliveries.update_status(id, DeliveryStatus::Sending, 0, "", "").await.unwrap();
    assert!(refused.is_none());

    let row = storage.deliveries.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(row.status, DeliveryStatus::Expired);
    assert_eq!(row.error_message, "Delivery expired");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn expired_events_are_reaped_with_their_deliveries() {
    let storage = Storage::new(test_pool().await);
    let ns = unique_namespace("user");

    let reg = registration(&ns, &["signup"], "http://receiver/a");
    storage.webhooks.create(&reg).await.unwrap();

    let mut evt = event(&ns, "signup");
    evt.created_at = evt.created_at - chrono::Duration::seconds(7200);
    evt.expires_at = evt.created_at + chrono::Duration::seconds(3600);
    storage.events.insert_if_absent(&evt).await.unwrap();

    let delivery = Delivery::pending(reg.id, evt.id, evt.expires_at, chrono::Utc::now());
    let delivery_id = storage.deliveries.create_or_get(&delivery).await.unwrap();

    let removed = storage.events.delete_expired(chrono::Utc::now()).await.unwrap();
    assert!(removed >= 1);

    assert!(storage.events.find_by_id(evt.id).await.unwrap().is_none());
    assert!(storage.deliveries.find_by_id(delivery_id).await.unwrap().is_none());
}
