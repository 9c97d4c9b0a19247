//! Property-based tests for core domain invariants.
//!
//! Deterministic, in-memory checks of rules that must hold for any input:
//! response truncation, event-set matching, and the status state machine.

use std::collections::HashMap;

use fanout_core::{
    models::{truncate_response_body, WebhookRegistration, RESPONSE_BODY_LIMIT},
    DeliveryStatus, WebhookId,
};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

/// Deterministic property test configuration for CI stability.
fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        timeout: 5000,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

fn registration_with_events(events: Vec<String>) -> WebhookRegistration {
    let now = chrono::Utc::now();
    WebhookRegistration {
        id: WebhookId::new(),
        namespace: "ns".into(),
        events: sqlx::types::Json(events),
        url: "http://receiver/hook".into(),
        headers: sqlx::types::Json(HashMap::new()),
        timeout_seconds: 30,
        active: true,
        description: String::new(),
        created_at: now,
        updated_at: now,
    }
}

fn any_status() -> impl Strategy<Value = DeliveryStatus> {
    prop::sample::select(vec![
        DeliveryStatus::Pending,
        DeliveryStatus::Sending,
        DeliveryStatus::Success,
        DeliveryStatus::Failed,
        DeliveryStatus::Retrying,
        DeliveryStatus::Expired,
    ])
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Truncation never exceeds the limit and always yields a prefix on a
    /// valid UTF-8 boundary.
    #[test]
    fn truncation_bounds_hold(body in ".{0,3000}") {
        let truncated = truncate_response_body(&body);

        prop_assert!(truncated.len() <= RESPONSE_BODY_LIMIT);
        prop_assert!(body.starts_with(&truncated));
        if body.len() <= RESPONSE_BODY_LIMIT {
            prop_assert_eq!(truncated, body);
        }
    }

    /// Event matching is exactly set membership, nothing fuzzier.
    #[test]
    fn subscribes_to_is_set_membership(
        events in prop::collection::vec("[a-z_.]{1,20}", 1..8),
        probe in "[a-z_.]{1,20}",
    ) {
        let registration = registration_with_events(events.clone());

        prop_assert_eq!(
            registration.subscribes_to(&probe),
            events.contains(&probe)
        );

        for event in &events {
            prop_assert!(registration.subscribes_to(event));
        }
    }

    /// Terminal statuses and attempt-concluding statuses are disjoint
    /// except for success: expiry never counts as an attempt.
    #[test]
    fn status_classification_is_consistent(status in any_status()) {
        if status == DeliveryStatus::Expired {
            prop_assert!(status.is_terminal());
            prop_assert!(!status.concludes_attempt());
        }
        if status == DeliveryStatus::Success {
            prop_assert!(status.is_terminal());
            prop_assert!(status.concludes_attempt());
        }
        if status == DeliveryStatus::Sending || status == DeliveryStatus::Pending {
            prop_assert!(!status.is_terminal());
            prop_assert!(!status.concludes_attempt());
        }

        // Display output round-trips through the stored literal set.
        let literal = status.to_string();
        prop_assert!(
            ["pending", "sending", "success", "failed", "retrying", "expired"]
                .contains(&literal.as_str())
        );
    }
}
