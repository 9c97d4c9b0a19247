//! Retry backoff timing for failed jobs.
//!
//! Exponential delays with jitter keep retries from synchronising across
//! workers after a shared outage.

use std::time::Duration;

use rand::Rng;

/// Computes the delay before re-running a job that failed on `attempt`.
///
/// Doubles the base delay per attempt, capped at `max_delay`, then applies
/// `jitter_factor` (0.0 to 1.0) as a symmetric randomisation. Attempt
/// numbers are 1-based; values below 1 are treated as the first attempt.
pub fn retry_delay(
    attempt: i32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
) -> Duration {
    let exponent = u32::try_from(attempt.max(1) - 1).unwrap_or(0).min(20);
    let multiplier = 2_u32.saturating_pow(exponent);
    let raw = base_delay.saturating_mul(multiplier);
    let capped = std::cmp::min(raw, max_delay);

    std::cmp::min(apply_jitter(capped, jitter_factor), max_delay)
}

/// Randomises a delay by up to `jitter_factor` in either direction.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();
    let range = duration.as_secs_f64() * clamped;
    let offset = rng.random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
