//! Integration tests for the service facade.
//!
//! These need a reachable PostgreSQL (`DATABASE_URL`); run them with
//! `cargo test -- --ignored`.

mod support;

use fanout_service::{NewWebhook, StatusSelector};
use support::{new_webhook, register, service, unique_namespace};

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn register_assigns_defaults_and_collapses_duplicates() {
    let (service, storage, _, _) = service().await;
    let ns = unique_namespace("user");

    let registered = service
        .register_webhook(new_webhook(&ns, &["signup", "login", "signup"], "http://receiver/a"))
        .await
        .unwrap();

    let stored = storage.webhooks.find_by_id(registered.webhook_id).await.unwrap().unwrap();
    assert!(stored.active, "unspecified active defaults to true");
    assert_eq!(stored.timeout_seconds, 30, "non-positive timeout takes the default");
    assert_eq!(stored.events.0, vec!["signup", "login"], "duplicate events collapse");
    assert_eq!(stored.created_at, registered.created_at);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn unregister_twice_succeeds_both_times() {
    let (service, _, _, _) = service().await;
    let ns = unique_namespace("user");

    let webhook_id = register(&service, &ns, &["signup"]).await;

    service.unregister_webhook(webhook_id).await.unwrap();
    service.unregister_webhook(webhook_id).await.unwrap();

    assert!(service.list_webhooks(&ns, false, None).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn push_event_samples_membership_and_enqueues_one_job() {
    let (service, _, _, pool) = service().await;
    let ns = unique_namespace("order");

    let matching_a = register(&service, &ns, &["created"]).await;
    let matching_b = register(&service, &ns, &["created", "cancelled"]).await;
    let _other_event = register(&service, &ns, &["shipped"]).await;

    let inactive = new_webhook(&ns, &["created"], "http://receiver/off");
    let inactive = NewWebhook { active: Some(false), ..inactive };
    service.register_webhook(inactive).await.unwrap();

    let pushed = service
        .push_event(&ns, "created", "{\"order\":7}", 0, Default::default())
        .await
        .unwrap();

    assert_eq!(pushed.webhooks_triggered, 2);
    assert!(pushed.webhook_ids.contains(&matching_a));
    assert!(pushed.webhook_ids.contains(&matching_b));

    // Exactly one event-processing job, carrying the assigned event id.
    let jobs: Vec<(i64,)> = sqlx::query_as(
        r"SELECT id FROM queue_jobs
          WHERE kind = 'event_processing' AND payload->>'event_id' = $1",
    )
    .bind(pushed.event_id.to_string())
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(jobs.len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn failed_push_enqueues_nothing() {
    let (service, _, _, pool) = service().await;
    let ns = unique_namespace("user");

    register(&service, &ns, &["signup"]).await;

    let err = service
        .push_event(&ns, "signup", "{not json", 3600, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, fanout_core::CoreError::InvalidInput(_)));

    let jobs: i64 = sqlx::query_scalar(
        r"SELECT COUNT(*) FROM queue_jobs
          WHERE kind = 'event_processing' AND payload->>'namespace' = $1",
    )
    .bind(&ns)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(jobs, 0);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn list_webhooks_applies_the_event_filter() {
    let (service, _, _, _) = service().await;
    let ns = unique_namespace("order");

    let created_only = register(&service, &ns, &["created"]).await;
    let both = register(&service, &ns, &["created", "shipped"]).await;
    let shipped_only = register(&service, &ns, &["shipped"]).await;

    let all = service.list_webhooks(&ns, false, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let created = service.list_webhooks(&ns, false, Some("created")).await.unwrap();
    let ids: Vec<_> = created.iter().map(|r| r.id).collect();
    assert_eq!(created.len(), 2);
    assert!(ids.contains(&created_only));
    assert!(ids.contains(&both));
    assert!(!ids.contains(&shipped_only));

    // The empty filter means no filter.
    let unfiltered = service.list_webhooks(&ns, false, Some("")).await.unwrap();
    assert_eq!(unfiltered.len(), 3);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database (set DATABASE_URL)"]
async fn status_of_unknown_ids_is_an_empty_list() {
    let (service, _, _, _) = service().await;

    let by_webhook =
        service.webhook_status(StatusSelector::Webhook(fanout_core::WebhookId::new())).await.unwrap();
    assert!(by_webhook.is_empty());

    let by_event =
        service.webhook_status(StatusSelector::Event(fanout_core::EventId::new())).await.unwrap();
    assert!(by_event.is_empty());
}
