//! Explicit, constructible process state.
//!
//! Grounded on the module-level singletons the distilled source uses for
//! anti-detection state, the robots cache, the fetcher, the session
//! manager, and the rate limiter (`app/scraping/state.py` and siblings).
//! SPEC_FULL.md §9 re-architects all of it as one explicit `RuntimeContext`
//! rather than lazily-initialized globals, so tests never leak state
//! between cases.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::antidetect::AntiDetectionState;
use crate::auth::{NullTokenVerifier, TokenVerifier};
use crate::fetch::{FetchEngine, ReqwestTransport};
use crate::ratelimit::InboundRateLimiter;
use crate::robots::RobotsCache;
use crate::session::SessionStore;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64_min(name: &str, default: u64, minimum: u64) -> u64 {
    let value = env_u64(name, default);
    if value < minimum {
        tracing::warn!(event = "config.invalid_env", variable = name, value, minimum, "value below minimum, using default");
        default
    } else {
        value
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Process configuration, read once at startup from `DIG_*` environment
/// variables (§6.4). Never mutated after construction.
#[derive(Debug, Clone)]
pub struct DigConfig {
    pub web_port: u16,
    pub mcp_port: u16,
    pub web_url: String,
    pub storage_dir: String,
    pub seq_url: Option<String>,
    pub seq_api_key: Option<String>,
    pub housekeeping_interval_mins: u64,
    pub max_storage_mb: u64,
    pub housekeeper_lock_stale_seconds: u64,
    pub rate_limit_calls: u32,
    pub rate_limit_window_seconds: u64,
    pub build_number: String,
    pub auth_enabled: bool,
}

impl DigConfig {
    pub fn from_env() -> Self {
        Self {
            web_port: env_u64("DIG_WEB_PORT", 8080) as u16,
            mcp_port: env_u64("DIG_MCP_PORT", 0) as u16,
            web_url: env_string("DIG_WEB_URL", "http://0.0.0.0:8080"),
            storage_dir: env_string("DIG_STORAGE", "./dig-storage"),
            seq_url: std::env::var("DIG_SEQ_URL").ok(),
            seq_api_key: std::env::var("DIG_SEQ_API_KEY").ok(),
            housekeeping_interval_mins: env_u64("DIG_HOUSEKEEPING_INTERVAL_MINS", 60),
            max_storage_mb: env_u64("DIG_MAX_STORAGE_MB", 1024),
            housekeeper_lock_stale_seconds: env_u64_min("DIG_HOUSEKEEPER_LOCK_STALE_SECONDS", 3600, 30),
            rate_limit_calls: env_u64("DIG_RATE_LIMIT_CALLS", 60) as u32,
            rate_limit_window_seconds: env_u64("DIG_RATE_LIMIT_WINDOW", 60),
            build_number: env_string("DIG_BUILD_NUMBER", "0.unknown"),
            auth_enabled: std::env::var("DIG_AUTH_ENABLED").map(|v| v != "0").unwrap_or(true),
        }
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            web_port: 0,
            mcp_port: 0,
            web_url: "http://127.0.0.1:0".to_string(),
            storage_dir: String::new(),
            seq_url: None,
            seq_api_key: None,
            housekeeping_interval_mins: 60,
            max_storage_mb: 1024,
            housekeeper_lock_stale_seconds: 3600,
            rate_limit_calls: 1000,
            rate_limit_window_seconds: 60,
            build_number: "test".to_string(),
            auth_enabled: false,
        }
    }
}

/// The bundle of shared, process-wide state passed (cheaply, via internal
/// `Arc`s) into every RPC/HTTP handler.
#[derive(Clone)]
pub struct RuntimeContext {
    pub antidetect: Arc<RwLock<AntiDetectionState>>,
    pub robots_cache: Arc<RobotsCache>,
    pub fetcher: Arc<FetchEngine>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<InboundRateLimiter>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub config: DigConfig,
}

impl RuntimeContext {
    pub fn new(config: DigConfig, token_verifier: Arc<dyn TokenVerifier>) -> std::io::Result<Self> {
        let fetcher = Arc::new(FetchEngine::new(Arc::new(ReqwestTransport::new())));
        Ok(Self {
            antidetect: Arc::new(RwLock::new(AntiDetectionState::default())),
            robots_cache: Arc::new(RobotsCache::new(fetcher.clone())),
            fetcher,
            sessions: Arc::new(SessionStore::new(&config.storage_dir)?),
            rate_limiter: Arc::new(InboundRateLimiter::new(config.rate_limit_calls, config.rate_limit_window_seconds)),
            token_verifier,
            config,
        })
    }

    /// A fresh context rooted at a temporary directory, with auth disabled
    /// and a generous rate limit, so tests never share state.
    #[cfg(test)]
    pub fn for_test(storage_dir: impl Into<std::path::PathBuf>) -> Self {
        let mut config = DigConfig::for_test();
        let storage_dir = storage_dir.into();
        config.storage_dir = storage_dir.to_string_lossy().to_string();
        let fetcher = Arc::new(FetchEngine::new(Arc::new(ReqwestTransport::new())));
        Self {
            antidetect: Arc::new(RwLock::new(AntiDetectionState::default())),
            robots_cache: Arc::new(RobotsCache::new(fetcher.clone())),
            fetcher,
            sessions: Arc::new(SessionStore::new(&storage_dir).expect("test storage dir")),
            rate_limiter: Arc::new(InboundRateLimiter::new(config.rate_limit_calls, config.rate_limit_window_seconds)),
            token_verifier: Arc::new(NullTokenVerifier),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_test_contexts_do_not_share_storage() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let ctx_a = RuntimeContext::for_test(dir_a.path());
        let ctx_b = RuntimeContext::for_test(dir_b.path());

        let guid = ctx_a.sessions.create_session("hello", "https://example.com", None, None).unwrap();
        assert!(ctx_b.sessions.get_session_info(&guid, None, false).is_err());
    }
}
