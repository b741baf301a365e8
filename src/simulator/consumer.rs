//! A single closed-loop consumer: issues paced HTTP GETs against a target
//! URL provider, retrying transient failures with the same backoff shape as
//! the production fetch engine.
//!
//! Grounded on `examples/original_source/simulator/core/consumer.py`'s
//! "Phase 1" behavior (plain HTTP GET against `SiteProvider`-chosen URLs,
//! with retry on 429/5xx). The MCP tool-mix consumer path in that file
//! drives tool calls over a streamable-HTTP MCP client; this crate's MCP
//! surface is served over stdio only (§6.1), so that path has no live
//! transport to exercise here and is intentionally not reproduced — wiring
//! it up is an operator-side extension once a streamable-HTTP MCP listener
//! exists.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::metrics::MetricsCollector;
use super::provider::UrlProvider;

const RETRY_STATUS_CODES: &[u16] = &[429, 502, 503, 504];
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub consumer_id: u32,
    pub rate_per_sec: f64,
    pub timeout_seconds: f64,
    pub persona: Option<String>,
}

/// Shared request budget across all consumers in a run; `None` means
/// unbounded (duration-based stop only).
pub struct RequestBudget {
    remaining: Option<AtomicI64>,
}

impl RequestBudget {
    pub fn new(total_requests: Option<u64>) -> Self {
        Self { remaining: total_requests.map(|n| AtomicI64::new(n as i64)) }
    }

    /// Returns `true` if one request was acquired from the budget.
    pub fn try_acquire(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(remaining) => {
                let prev = remaining.fetch_sub(1, Ordering::SeqCst);
                if prev <= 0 {
                    remaining.fetch_add(1, Ordering::SeqCst);
                    false
                } else {
                    true
                }
            }
        }
    }
}

#[derive(Default)]
pub struct Counters {
    ok: AtomicU64,
    error: AtomicU64,
}

impl Counters {
    pub fn record_ok(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64) {
        (self.ok.load(Ordering::Relaxed), self.error.load(Ordering::Relaxed))
    }
}

/// Cooperative stop signal shared by every consumer task and the
/// duration-based timeout task.
#[derive(Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn set(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub struct Consumer {
    config: ConsumerConfig,
    provider: Arc<dyn UrlProvider>,
    metrics: Arc<MetricsCollector>,
    client: reqwest::Client,
}

impl Consumer {
    pub fn new(config: ConsumerConfig, provider: Arc<dyn UrlProvider>, metrics: Arc<MetricsCollector>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_seconds.max(0.1)))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent("dig-simulator/0.1")
            .build()?;
        Ok(Self { config, provider, metrics, client })
    }

    pub async fn run(&self, stop: Arc<StopSignal>, budget: Arc<RequestBudget>, counters: Arc<Counters>) {
        if self.config.rate_per_sec <= 0.0 {
            tracing::warn!(event = "sim.invalid_rate", consumer_id = self.config.consumer_id, "rate_per_sec must be > 0, consumer exiting");
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.rate_per_sec);
        let mut next_fire = Instant::now();

        while !stop.is_set() {
            if !budget.try_acquire() {
                stop.set();
                break;
            }

            let now = Instant::now();
            if now < next_fire {
                tokio::time::sleep(next_fire - now).await;
            }
            next_fire = next_fire.max(Instant::now()) + interval;

            let url = self.provider.choose_url();
            let start = Instant::now();
            let (success, error_type) = self.request_with_retry(&url).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            self.metrics
                .record("http.get", duration_ms, success, self.config.persona.as_deref(), error_type.as_deref())
                .await;

            if success {
                counters.record_ok();
                tracing::info!(
                    event = "sim.consumer_request_ok",
                    consumer_id = self.config.consumer_id,
                    url = %url,
                    duration_ms,
                    "consumer request succeeded"
                );
            } else {
                counters.record_error();
                tracing::warn!(
                    event = "sim.consumer_request_error",
                    consumer_id = self.config.consumer_id,
                    url = %url,
                    duration_ms,
                    error_type = error_type.as_deref().unwrap_or("unknown"),
                    "consumer request failed"
                );
            }
        }
    }

    /// GET with exponential backoff on retryable status codes, honoring
    /// `Retry-After`. Returns `(success, error_type)`.
    async fn request_with_retry(&self, url: &str) -> (bool, Option<String>) {
        for attempt in 0..=MAX_RETRIES {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if RETRY_STATUS_CODES.contains(&status) && attempt < MAX_RETRIES {
                        let retry_after = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs);
                        let delay = backoff_delay(attempt, retry_after);
                        tracing::info!(
                            event = "sim.consumer_retry",
                            consumer_id = self.config.consumer_id,
                            url = %url,
                            status,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after backoff"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return (classify_http_status(status).is_none(), classify_http_status(status));
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        tokio::time::sleep(backoff_delay(attempt, None)).await;
                        continue;
                    }
                    return (false, Some(classify_reqwest_error(&err)));
                }
            }
        }
        (false, Some("client_error".to_string()))
    }
}

fn classify_http_status(status: u16) -> Option<String> {
    if (200..400).contains(&status) {
        return None;
    }
    Some(match status {
        401 => "auth_unauthorized".to_string(),
        403 => "auth_forbidden".to_string(),
        404 => "not_found".to_string(),
        429 => "rate_limited".to_string(),
        400..=499 => "client_error".to_string(),
        500..=599 => "server_error".to_string(),
        other => format!("http_{other}"),
    })
}

fn classify_reqwest_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "network_timeout".to_string()
    } else if err.is_connect() {
        "network_connect".to_string()
    } else if err.is_request() || err.is_body() || err.is_decode() {
        "network_protocol".to_string()
    } else {
        "network_error".to_string()
    }
}

fn backoff_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(retry_after) = retry_after {
        return retry_after.min(BACKOFF_MAX);
    }
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    exp.min(BACKOFF_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_budget_stops_at_zero() {
        let budget = RequestBudget::new(Some(2));
        assert!(budget.try_acquire());
        assert!(budget.try_acquire());
        assert!(!budget.try_acquire());
    }

    #[test]
    fn request_budget_unbounded_always_acquires() {
        let budget = RequestBudget::new(None);
        for _ in 0..1000 {
            assert!(budget.try_acquire());
        }
    }

    #[test]
    fn counters_accumulate_independently() {
        let counters = Counters::default();
        counters.record_ok();
        counters.record_ok();
        counters.record_error();
        assert_eq!(counters.snapshot(), (2, 1));
    }

    #[test]
    fn backoff_honors_retry_after_and_caps() {
        assert_eq!(backoff_delay(0, Some(Duration::from_secs(2))), Duration::from_secs(2));
        assert_eq!(backoff_delay(10, None), BACKOFF_MAX);
    }

    #[test]
    fn classify_http_status_maps_known_codes() {
        assert_eq!(classify_http_status(200), None);
        assert_eq!(classify_http_status(429), Some("rate_limited".to_string()));
        assert_eq!(classify_http_status(404), Some("not_found".to_string()));
        assert_eq!(classify_http_status(503), Some("server_error".to_string()));
    }
}
