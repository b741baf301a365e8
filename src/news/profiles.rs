//! Source profiles: pure-data configuration for the deterministic parser.
//!
//! Grounded on `examples/original_source/app/processing/source_profiles.py`.
//! The `scmp` profile is carried over with its shape intact but renamed to
//! `default_news` so the crate doesn't hard-code a specific outside
//! publication's name.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub name: String,
    pub display_name: String,
    pub timezone: String,
    pub utc_offset: String,
    pub date_patterns: Vec<String>,
    pub section_labels: Vec<String>,
    pub noise_markers: Vec<String>,
    pub sponsored_markers: Vec<String>,
    pub exclusive_markers: Vec<String>,
    pub opinion_labels: Vec<String>,
}

fn generic_profile() -> SourceProfile {
    SourceProfile {
        name: "generic".to_string(),
        display_name: "Unknown Source".to_string(),
        timezone: "UTC".to_string(),
        utc_offset: "+00:00".to_string(),
        date_patterns: vec![
            r"\d{1,2}\s+\w+\s+\d{4}\s*-\s*\d{1,2}:\d{2}[AP]M".to_string(),
            r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}".to_string(),
            r"\w+\s+\d{1,2},?\s+\d{4}".to_string(),
            r"\d+\s+(minutes?|hours?|days?)\s+ago".to_string(),
        ],
        section_labels: vec![],
        noise_markers: vec![
            "TRENDING".to_string(),
            "MOST POPULAR".to_string(),
            "ADVERTISEMENT".to_string(),
            "SPONSORED".to_string(),
        ],
        sponsored_markers: vec!["Sponsored:".to_string(), "Paid Post:".to_string(), "In partnership with:".to_string()],
        exclusive_markers: vec!["Exclusive".to_string(), "EXCLUSIVE".to_string()],
        opinion_labels: vec!["Opinion".to_string(), "Editorial".to_string(), "Commentary".to_string()],
    }
}

fn default_news_profile() -> SourceProfile {
    SourceProfile {
        name: "default_news".to_string(),
        display_name: "Default News Source".to_string(),
        timezone: "Asia/Hong_Kong".to_string(),
        utc_offset: "+08:00".to_string(),
        date_patterns: vec![
            r"\d{1,2}\s+\w+\s+\d{4}\s*-\s*\d{1,2}:\d{2}[AP]M".to_string(),
            r"\d+\s+(minutes?|hours?)\s+ago".to_string(),
        ],
        section_labels: vec![
            "Business".to_string(),
            "Tech".to_string(),
            "China Economy".to_string(),
            "Banking & Finance".to_string(),
            "Opinion".to_string(),
            "Markets".to_string(),
            "Companies".to_string(),
            "Property".to_string(),
            "China".to_string(),
            "Asia".to_string(),
            "World".to_string(),
        ],
        noise_markers: vec![
            "TRENDING TOPICS".to_string(),
            "MOST POPULAR".to_string(),
            "MORE LATEST NEWS".to_string(),
            "MORE COMMENT".to_string(),
        ],
        sponsored_markers: vec!["In partnership with:".to_string(), "Paid Post:".to_string()],
        exclusive_markers: vec!["Exclusive".to_string()],
        opinion_labels: vec!["Opinion".to_string(), "Macroscope".to_string(), "As I see it".to_string()],
    }
}

static REGISTRY: Lazy<HashMap<&'static str, fn() -> SourceProfile>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, fn() -> SourceProfile> = HashMap::new();
    m.insert("default_news", default_news_profile);
    m
});

/// Returns the named profile, or `generic` with a logged warning when the
/// name is unknown. Never errors — the registry guarantees every entry has
/// well-formed `date_patterns`, so there is no malformed-profile path to
/// surface as a hard error here.
pub fn get_source_profile(name: Option<&str>) -> SourceProfile {
    match name {
        Some(name) => match REGISTRY.get(name) {
            Some(factory) => factory(),
            None => {
                warn!(event = "unknown_source_profile", requested = name, "falling back to generic profile");
                generic_profile()
            }
        },
        None => generic_profile(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_profile_falls_back_to_generic() {
        let profile = get_source_profile(Some("no-such-profile"));
        assert_eq!(profile.name, "generic");
    }

    #[test]
    fn none_falls_back_to_generic() {
        let profile = get_source_profile(None);
        assert_eq!(profile.name, "generic");
    }

    #[test]
    fn named_profile_is_returned() {
        let profile = get_source_profile(Some("default_news"));
        assert_eq!(profile.utc_offset, "+08:00");
    }
}
