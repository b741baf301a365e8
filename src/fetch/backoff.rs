//! Exponential backoff with jitter, honoring `Retry-After` when present.

use std::time::Duration;

use rand::Rng;

/// `base * 2^attempt + jitter`, with `jitter ~ U(0, base)`, capped at `max`.
/// A server's `Retry-After` value always wins when present, also capped at
/// `max`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after.min(max);
    }

    let exponent = attempt.min(10);
    let scaled = base.saturating_mul(1u32 << exponent);

    let mut rng = rand::rng();
    let jitter_secs: f64 = rng.random_range(0.0..base.as_secs_f64());
    let jitter = Duration::from_secs_f64(jitter_secs);
    scaled.saturating_add(jitter).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_takes_priority() {
        let delay = calculate_backoff(0, Duration::from_secs(1), Duration::from_secs(30), Some(Duration::from_secs(5)));
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn backoff_grows_with_attempt_and_respects_cap() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);
        let early = calculate_backoff(0, base, max, None);
        let late = calculate_backoff(8, base, max, None);
        assert!(early < late || late <= max);
        assert!(late <= max);
    }
}
