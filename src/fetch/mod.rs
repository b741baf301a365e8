//! Validated, paced, retrying HTTP GET.
//!
//! Grounded on `examples/original_source/app/scraping/fetcher.py`: retry
//! status set, backoff formula, `Retry-After` handling, and per-host pacing
//! are carried over. The per-host pacing map follows the same
//! `DashMap`-per-key shape the teacher uses in `crawl_engine::rate_limiter`,
//! traded for a plain "wait until" timestamp since the fetch engine needs
//! blocking pacing, not a token-bucket admit/deny decision.

mod backoff;
mod transport;

pub use backoff::calculate_backoff;
pub use transport::{PreparedRequest, RawResponse, ReqwestTransport, Transport, TransportError, TransportErrorKind};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use crate::antidetect::AntiDetectionState;
use crate::validation::{validate_url, ValidationError};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_REDIRECTS: usize = 10;

const RETRY_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub final_url: String,
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub encoding: String,
    pub error: Option<String>,
    pub retry_count: u32,
    pub rate_limited: bool,
}

impl FetchResult {
    pub fn success(&self) -> bool {
        self.error.is_none() && (200..400).contains(&self.status)
    }

    fn failed(url: &str, error: String) -> Self {
        Self {
            final_url: url.to_string(),
            status: 0,
            body: String::new(),
            content_type: None,
            headers: HashMap::new(),
            encoding: "utf-8".to_string(),
            error: Some(error),
            retry_count: 0,
            rate_limited: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("timed out fetching {url}")]
    Timeout { url: String },
    #[error("connection error fetching {url}: {message}")]
    Connection { url: String, message: String },
    #[error("fetch failed for {url}: {message}")]
    Other { url: String, message: String },
}

impl FetchError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.error_code(),
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::Other { .. } => "FETCH_ERROR",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::Validation(e) => e.details(),
            Self::Timeout { url } => json!({ "url": url }),
            Self::Connection { url, message } => json!({ "url": url, "message": message }),
            Self::Other { url, message } => json!({ "url": url, "message": message }),
        }
    }
}

/// Granular failure classification used by the crawler (SPEC_FULL.md §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    UrlNotFound,
    AccessDenied,
    RateLimited,
    FetchError,
    SsrfBlocked,
    TimeoutError,
    ConnectionError,
}

impl FetchFailureKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::UrlNotFound => "URL_NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::RateLimited => "RATE_LIMITED",
            Self::FetchError => "FETCH_ERROR",
            Self::SsrfBlocked => "SSRF_BLOCKED",
            Self::TimeoutError => "TIMEOUT_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
        }
    }

    pub fn classify(result: &FetchResult) -> Option<Self> {
        if result.success() {
            return None;
        }
        if let Some(err) = &result.error {
            let lower = err.to_ascii_lowercase();
            if lower.contains("ssrf") || lower.contains("private") || lower.contains("metadata") {
                return Some(Self::SsrfBlocked);
            }
            if lower.contains("timeout") {
                return Some(Self::TimeoutError);
            }
            if lower.contains("connection") || lower.contains("dns") {
                return Some(Self::ConnectionError);
            }
        }
        match result.status {
            404 => Some(Self::UrlNotFound),
            401 | 403 => Some(Self::AccessDenied),
            429 => Some(Self::RateLimited),
            0 => Some(Self::FetchError),
            _ => Some(Self::FetchError),
        }
    }
}

/// Validated, paced, retrying HTTP GET. One instance is shared process-wide
/// via `RuntimeContext`.
pub struct FetchEngine {
    transport: Arc<dyn Transport>,
    last_request: DashMap<String, Arc<Mutex<Instant>>>,
    rate_limit_delay: Mutex<Duration>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl FetchEngine {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            last_request: DashMap::new(),
            rate_limit_delay: Mutex::new(Duration::from_secs(1)),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn set_rate_limit_delay(&self, delay: Duration) {
        *self.rate_limit_delay.lock() = delay;
    }

    async fn pace(&self, host: &str) {
        let delay = *self.rate_limit_delay.lock();
        if delay.is_zero() {
            return;
        }
        let entry = self
            .last_request
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Instant::now() - delay)))
            .clone();

        let wait = {
            let mut last = entry.lock();
            let now = Instant::now();
            let earliest = *last + delay;
            let wait = earliest.saturating_duration_since(now);
            *last = now.max(earliest);
            wait
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// The public, validated entry point used by the crawler and RPC
    /// handlers: runs URL validation, per-host pacing, header composition,
    /// and the retry loop.
    pub async fn fetch(
        &self,
        url: &str,
        antidetect: &AntiDetectionState,
        rotate_user_agent: bool,
        extra_headers: &[(String, String)],
        timeout_override: Option<Duration>,
    ) -> FetchResult {
        if let Err(err) = validate_url(url) {
            return FetchResult::failed(url, err.to_string());
        }

        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => return FetchResult::failed(url, e.to_string()),
        };
        let host = parsed.host_str().unwrap_or("").to_string();
        self.pace(&host).await;

        let mut headers = antidetect.headers(rotate_user_agent, fastrand_nonce(url));
        headers.extend(extra_headers.iter().cloned());
        let timeout = timeout_override.unwrap_or(DEFAULT_TIMEOUT);

        self.retry_loop(url, headers, timeout).await
    }

    /// Low-level fetch bypassing per-call host pacing state keyed by the
    /// shared antidetect profile — used by the robots.txt fetcher, which
    /// always uses the `none` profile and a short fixed timeout.
    pub async fn fetch_raw(
        &self,
        url: &str,
        antidetect: &AntiDetectionState,
        timeout_override: Option<Duration>,
    ) -> Result<FetchResult, FetchError> {
        validate_url(url)?;
        let headers = antidetect.headers(false, 0);
        let timeout = timeout_override.unwrap_or(DEFAULT_TIMEOUT);
        Ok(self.retry_loop(url, headers, timeout).await)
    }

    async fn retry_loop(&self, url: &str, headers: Vec<(String, String)>, timeout: Duration) -> FetchResult {
        let mut attempt: u32 = 0;
        let mut rate_limited = false;

        loop {
            let request = PreparedRequest {
                url: url.to_string(),
                headers: headers.clone(),
                timeout,
                max_redirects: MAX_REDIRECTS,
            };

            match self.transport.execute(request).await {
                Ok(response) => {
                    if response.status == 429 {
                        rate_limited = true;
                    }
                    let should_retry = RETRY_STATUS_CODES.contains(&response.status) && attempt < self.max_retries;
                    if should_retry {
                        let retry_after = response
                            .headers
                            .get("retry-after")
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs);
                        let delay = calculate_backoff(attempt, self.base_delay, self.max_delay, retry_after);
                        warn!(event = "fetch_retry", url = %url, status = response.status, attempt, "retrying after backoff");
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    let error = if response.status >= 400 {
                        Some(format!("HTTP {}", response.status))
                    } else {
                        None
                    };

                    return FetchResult {
                        final_url: response.final_url,
                        status: response.status,
                        body: response.body,
                        content_type: response.headers.get("content-type").cloned(),
                        headers: response.headers,
                        encoding: response.encoding,
                        error,
                        retry_count: attempt,
                        rate_limited,
                    };
                }
                Err(transport_err) => {
                    let retryable = matches!(
                        transport_err.kind,
                        TransportErrorKind::Timeout | TransportErrorKind::Connection
                    );
                    if retryable && attempt < self.max_retries {
                        let delay = calculate_backoff(attempt, self.base_delay, self.max_delay, None);
                        warn!(event = "fetch_retry", url = %url, error = %transport_err, attempt, "retrying after transport error");
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    info!(event = "fetch_failed", url = %url, error = %transport_err, "fetch exhausted retries");
                    let mut result = FetchResult::failed(url, transport_err.to_string());
                    result.retry_count = attempt;
                    result.rate_limited = rate_limited;
                    return result;
                }
            }
        }
    }
}

fn fastrand_nonce(seed_text: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let mut hasher = DefaultHasher::new();
    seed_text.hash(&mut hasher);
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::transport::tests::ScriptedTransport;

    #[tokio::test]
    async fn success_status_is_reported() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![Ok(RawResponse {
            final_url: "http://example.com/".to_string(),
            status: 200,
            body: "hello".to_string(),
            headers: HashMap::new(),
            encoding: "utf-8".to_string(),
        })]));
        let engine = FetchEngine::new(transport);
        engine.set_rate_limit_delay(Duration::from_millis(0));
        let antidetect = AntiDetectionState::default();
        let result = engine.fetch("http://example.com/", &antidetect, false, &[], None).await;
        assert!(result.success());
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn retry_after_is_honored_and_retry_count_reported() {
        let mut retry_after_headers = HashMap::new();
        retry_after_headers.insert("retry-after".to_string(), "0".to_string());
        let transport = Arc::new(ScriptedTransport::sequence(vec![
            Ok(RawResponse {
                final_url: "http://example.com/".to_string(),
                status: 429,
                body: String::new(),
                headers: retry_after_headers,
                encoding: "utf-8".to_string(),
            }),
            Ok(RawResponse {
                final_url: "http://example.com/".to_string(),
                status: 200,
                body: "ok".to_string(),
                headers: HashMap::new(),
                encoding: "utf-8".to_string(),
            }),
        ]));
        let engine = FetchEngine::new(transport);
        engine.set_rate_limit_delay(Duration::from_millis(0));
        let antidetect = AntiDetectionState::default();
        let result = engine.fetch("http://example.com/", &antidetect, false, &[], None).await;
        assert!(result.success());
        assert_eq!(result.retry_count, 1);
        assert!(result.rate_limited);
    }

    #[tokio::test]
    async fn ssrf_blocked_urls_never_reach_the_transport() {
        let transport = Arc::new(ScriptedTransport::sequence(vec![]));
        let engine = FetchEngine::new(transport);
        let antidetect = AntiDetectionState::default();
        let result = engine.fetch("http://127.0.0.1/", &antidetect, false, &[], None).await;
        assert!(!result.success());
        assert_eq!(FetchFailureKind::classify(&result), Some(FetchFailureKind::SsrfBlocked));
    }
}
