//! Inbound sliding-window rate limiter for tool/HTTP calls.
//!
//! Grounded on `examples/original_source/app/rate_limit.py`: the sliding
//! window and bucket-pruning logic are carried over verbatim; the
//! `threading.Lock`-guarded `dict` becomes a `dashmap::DashMap`, mirroring
//! the teacher's own per-host state in `crawl_engine::rate_limiter`.

use std::time::Instant;

use dashmap::DashMap;
use tracing::warn;

const ANONYMOUS_KEY: &str = "__anonymous__";

/// Outcome of a rate-limit check: `remaining` calls left in the window,
/// the configured `limit`, and `reset_seconds` until the oldest entry
/// expires.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub limit: u32,
    pub reset_seconds: u64,
}

struct Bucket {
    timestamps: Vec<Instant>,
}

/// Sliding-window counter keyed by identity (primary group, or a shared
/// anonymous bucket). Safe under concurrent callers via `DashMap`'s
/// per-shard locking.
pub struct InboundRateLimiter {
    max_calls: u32,
    window: std::time::Duration,
    buckets: DashMap<String, Bucket>,
}

impl InboundRateLimiter {
    pub fn new(max_calls: u32, window_seconds: u64) -> Self {
        Self {
            max_calls,
            window: std::time::Duration::from_secs(window_seconds),
            buckets: DashMap::new(),
        }
    }

    /// Checks whether a call from `identity` (`None` ⇒ anonymous) is
    /// admitted, recording it if so.
    pub fn check(&self, identity: Option<&str>) -> (bool, RateLimitInfo) {
        let key = identity.unwrap_or(ANONYMOUS_KEY);
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window).unwrap_or(now);

        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            timestamps: Vec::new(),
        });
        bucket.timestamps.retain(|t| *t > cutoff);

        let used = bucket.timestamps.len() as u32;
        let remaining = self.max_calls.saturating_sub(used);
        let reset_seconds = bucket
            .timestamps
            .first()
            .map(|oldest| (*oldest + self.window).saturating_duration_since(now).as_secs() + 1)
            .unwrap_or(0);

        if remaining == 0 {
            warn!(event = "ratelimit.exceeded", identity = key, limit = self.max_calls, "rate limit exceeded");
            return (
                false,
                RateLimitInfo {
                    remaining: 0,
                    limit: self.max_calls,
                    reset_seconds,
                },
            );
        }

        bucket.timestamps.push(now);
        (
            true,
            RateLimitInfo {
                remaining: remaining - 1,
                limit: self.max_calls,
                reset_seconds,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_calls_up_to_the_limit() {
        let limiter = InboundRateLimiter::new(2, 60);
        let (ok1, _) = limiter.check(Some("apac"));
        let (ok2, _) = limiter.check(Some("apac"));
        let (ok3, info3) = limiter.check(Some("apac"));
        assert!(ok1 && ok2);
        assert!(!ok3);
        assert_eq!(info3.remaining, 0);
    }

    #[test]
    fn separate_identities_have_separate_buckets() {
        let limiter = InboundRateLimiter::new(1, 60);
        let (apac_ok, _) = limiter.check(Some("apac"));
        let (emea_ok, _) = limiter.check(Some("emea"));
        assert!(apac_ok && emea_ok);
    }

    #[test]
    fn anonymous_calls_share_one_bucket() {
        let limiter = InboundRateLimiter::new(1, 60);
        let (first_ok, _) = limiter.check(None);
        let (second_ok, _) = limiter.check(None);
        assert!(first_ok);
        assert!(!second_ok);
    }
}
