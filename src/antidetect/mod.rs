//! Outgoing-header profiles and User-Agent rotation.
//!
//! Grounded on `examples/original_source/app/scraping/antidetection.py`:
//! the five profiles, the UA pool, and the header composition rules are
//! carried over; rotation uses a seeded PRNG (`rand::rngs::StdRng`) instead
//! of Python's module-level `random`, so it stays deterministic under test.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edg/120.0.0.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 OPR/105.0.0.0",
];

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const ACCEPT_ENCODING: &str = "gzip, deflate, br";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiDetectionProfile {
    None,
    Balanced,
    Stealth,
    Custom,
    BrowserTls,
}

impl AntiDetectionProfile {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "balanced" => Some(Self::Balanced),
            "stealth" => Some(Self::Stealth),
            "custom" => Some(Self::Custom),
            "browser_tls" => Some(Self::BrowserTls),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Balanced => "balanced",
            Self::Stealth => "stealth",
            Self::Custom => "custom",
            Self::BrowserTls => "browser_tls",
        }
    }
}

/// Process-wide anti-detection configuration, held behind `RwLock` in
/// `RuntimeContext` rather than a module-level singleton (SPEC_FULL.md §9).
#[derive(Debug, Clone)]
pub struct AntiDetectionState {
    pub profile: AntiDetectionProfile,
    pub custom_headers: HashMap<String, String>,
    pub custom_user_agent: Option<String>,
    rng_seed: u64,
    sticky_index: usize,
}

impl Default for AntiDetectionState {
    fn default() -> Self {
        Self {
            profile: AntiDetectionProfile::Balanced,
            custom_headers: HashMap::new(),
            custom_user_agent: None,
            rng_seed: 0x5EED,
            sticky_index: 0,
        }
    }
}

impl AntiDetectionState {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng_seed: seed,
            ..Default::default()
        }
    }

    /// Returns the User-Agent to use. `rotate = false` reuses the sticky UA;
    /// `rotate = true` draws a new one from a PRNG seeded from `rng_seed`
    /// mixed with a per-call nonce, so repeated calls are deterministic
    /// under a fixed seed+nonce sequence but vary across calls.
    pub fn user_agent(&self, rotate: bool, call_nonce: u64) -> String {
        match self.profile {
            AntiDetectionProfile::None => "dig-scraper/1.0".to_string(),
            AntiDetectionProfile::Custom => self
                .custom_user_agent
                .clone()
                .unwrap_or_else(|| "dig-scraper/1.0".to_string()),
            _ => {
                let idx = if rotate {
                    let mut rng = StdRng::seed_from_u64(self.rng_seed ^ call_nonce);
                    rng.random_range(0..USER_AGENTS.len())
                } else {
                    self.sticky_index % USER_AGENTS.len()
                };
                USER_AGENTS[idx].to_string()
            }
        }
    }

    /// Builds the full outgoing header set for one request.
    pub fn headers(&self, rotate_user_agent: bool, call_nonce: u64) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        let ua = self.user_agent(rotate_user_agent, call_nonce);
        headers.push(("User-Agent".to_string(), ua));

        match self.profile {
            AntiDetectionProfile::None => {}
            AntiDetectionProfile::Custom => {
                for (k, v) in &self.custom_headers {
                    headers.push((k.clone(), v.clone()));
                }
            }
            AntiDetectionProfile::Balanced | AntiDetectionProfile::BrowserTls => {
                headers.push(("Accept".to_string(), ACCEPT_HTML.to_string()));
                headers.push(("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()));
                headers.push(("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()));
            }
            AntiDetectionProfile::Stealth => {
                headers.push(("Accept".to_string(), ACCEPT_HTML.to_string()));
                headers.push(("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()));
                headers.push(("Accept-Encoding".to_string(), ACCEPT_ENCODING.to_string()));
                headers.push(("Sec-Ch-Ua".to_string(), "\"Chromium\";v=\"120\", \"Not=A?Brand\";v=\"99\"".to_string()));
                headers.push(("Sec-Ch-Ua-Mobile".to_string(), "?0".to_string()));
                headers.push(("Sec-Fetch-Dest".to_string(), "document".to_string()));
                headers.push(("Sec-Fetch-Mode".to_string(), "navigate".to_string()));
                headers.push(("Sec-Fetch-Site".to_string(), "none".to_string()));
                headers.push(("Cache-Control".to_string(), "max-age=0".to_string()));
                headers.push(("Upgrade-Insecure-Requests".to_string(), "1".to_string()));
                headers.push(("Connection".to_string(), "keep-alive".to_string()));
            }
        }
        headers
    }

    pub fn profile_info(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile.as_str(),
            "has_custom_headers": !self.custom_headers.is_empty(),
            "has_custom_user_agent": self.custom_user_agent.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_profile_uses_minimal_ua() {
        let state = AntiDetectionState::default();
        let mut state = state;
        state.profile = AntiDetectionProfile::None;
        assert_eq!(state.user_agent(false, 0), "dig-scraper/1.0");
        assert_eq!(state.headers(false, 0).len(), 1);
    }

    #[test]
    fn stealth_profile_includes_sec_headers() {
        let mut state = AntiDetectionState::default();
        state.profile = AntiDetectionProfile::Stealth;
        let headers = state.headers(false, 0);
        assert!(headers.iter().any(|(k, _)| k == "Sec-Fetch-Mode"));
    }

    #[test]
    fn rotation_is_deterministic_under_fixed_seed_and_nonce() {
        let state = AntiDetectionState::with_seed(42);
        let a = state.user_agent(true, 7);
        let b = state.user_agent(true, 7);
        assert_eq!(a, b);
    }
}
