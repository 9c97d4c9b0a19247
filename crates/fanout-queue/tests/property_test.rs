//! Property-based tests for retry backoff timing.

use std::time::Duration;

use fanout_queue::backoff::retry_delay;
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 128,
        timeout: 5000,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

proptest! {
    #![proptest_config(proptest_config())]

    /// The cap holds for any attempt number and jitter setting.
    #[test]
    fn delay_never_exceeds_the_cap(
        attempt in -5i32..200,
        base_ms in 1u64..5_000,
        max_ms in 1u64..600_000,
        jitter in 0.0f64..1.0,
    ) {
        let delay = retry_delay(
            attempt,
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            jitter,
        );

        prop_assert!(delay <= Duration::from_millis(max_ms));
    }

    /// Without jitter, delays are monotone non-decreasing in the attempt.
    #[test]
    fn delays_grow_monotonically_without_jitter(
        base_ms in 1u64..2_000,
        max_ms in 1u64..600_000,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = Duration::from_millis(max_ms);

        let mut previous = Duration::ZERO;
        for attempt in 1..=30 {
            let delay = retry_delay(attempt, base, max, 0.0);
            prop_assert!(delay >= previous, "attempt {attempt} shrank the delay");
            previous = delay;
        }
    }
}
