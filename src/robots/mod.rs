//! robots.txt fetching, parsing, caching, and most-specific-match resolution.
//!
//! Grounded on `examples/original_source/app/scraping/robots.py`. The regex
//! based matcher (`*` → `.*`, trailing `$` → end anchor, otherwise implicit
//! prefix match) and the effective-pattern-length tie-break are carried over
//! verbatim; the process-lifetime cache uses `dashmap::DashMap` instead of a
//! module-level `dict`, mirroring the teacher's own per-domain maps in
//! `crawl_engine::rate_limiter`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::antidetect::{AntiDetectionProfile, AntiDetectionState};
use crate::fetch::FetchEngine;

#[derive(Debug, Clone)]
pub struct RobotsRule {
    pub path_pattern: String,
    pub allow: bool,
}

impl RobotsRule {
    /// Effective pattern length: `pattern.rstrip("*$")`'s length. Ties in the
    /// most-specific-match resolution favor the rule with the greater value.
    fn effective_length(&self) -> usize {
        self.path_pattern.trim_end_matches(['*', '$']).len()
    }

    fn matches(&self, path: &str) -> bool {
        let mut regex_str = String::with_capacity(self.path_pattern.len() * 2);
        regex_str.push('^');
        let anchored_end = self.path_pattern.ends_with('$');
        let body = self.path_pattern.strip_suffix('$').unwrap_or(&self.path_pattern);
        for ch in body.chars() {
            match ch {
                '*' => regex_str.push_str(".*"),
                c if regex_syntax_needs_escape(c) => {
                    regex_str.push('\\');
                    regex_str.push(c);
                }
                c => regex_str.push(c),
            }
        }
        if anchored_end {
            regex_str.push('$');
        } else if !body.contains('*') {
            regex_str.push_str(".*");
        }
        Regex::new(&regex_str).map(|re| re.is_match(path)).unwrap_or(false)
    }
}

fn regex_syntax_needs_escape(c: char) -> bool {
    matches!(
        c,
        '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' | '?'
    )
}

#[derive(Debug, Clone, Default)]
pub struct RobotsRuleSet {
    pub rules: Vec<RobotsRule>,
    pub crawl_delay: Option<f64>,
}

impl RobotsRuleSet {
    /// Most-specific-match: the matching rule with the greatest effective
    /// length wins; `Allow` beats `Disallow` at equal length. No match ⇒
    /// default allow.
    pub fn is_allowed(&self, url_path: &str) -> bool {
        let mut best: Option<&RobotsRule> = None;
        for rule in &self.rules {
            if !rule.matches(url_path) {
                continue;
            }
            best = match best {
                None => Some(rule),
                Some(current) => {
                    let current_len = current.effective_length();
                    let rule_len = rule.effective_length();
                    if rule_len > current_len || (rule_len == current_len && rule.allow && !current.allow) {
                        Some(rule)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.map(|r| r.allow).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RobotsFile {
    pub agents: Vec<(String, RobotsRuleSet)>,
    pub sitemaps: Vec<String>,
}

impl RobotsFile {
    fn rules_for_agent(&self, user_agent: &str) -> RobotsRuleSet {
        let ua_lower = user_agent.to_ascii_lowercase();

        if let Some((_, rules)) = self
            .agents
            .iter()
            .find(|(agent, _)| agent.eq_ignore_ascii_case(&ua_lower))
        {
            return rules.clone();
        }

        let mut best: Option<&(String, RobotsRuleSet)> = None;
        for entry in &self.agents {
            if entry.0 == "*" {
                continue;
            }
            if ua_lower.starts_with(&entry.0.to_ascii_lowercase()) {
                if best.as_ref().map(|b| b.0.len() < entry.0.len()).unwrap_or(true) {
                    best = Some(entry);
                }
            }
        }
        if let Some((_, rules)) = best {
            return rules.clone();
        }

        if let Some((_, rules)) = self.agents.iter().find(|(agent, _)| agent == "*") {
            return rules.clone();
        }

        RobotsRuleSet::default()
    }

    pub fn is_allowed(&self, url_path: &str, user_agent: &str) -> bool {
        self.rules_for_agent(user_agent).is_allowed(url_path)
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.rules_for_agent(user_agent).crawl_delay
    }
}

/// Line-oriented robots.txt parser: `User-agent`, `Disallow`, `Allow`,
/// `Crawl-delay`, `Sitemap`; `#` starts a comment; a `User-agent` line
/// following existing rules starts a new group.
pub fn parse_robots_txt(content: &str) -> RobotsFile {
    let mut agents: Vec<(String, RobotsRuleSet)> = Vec::new();
    let mut sitemaps = Vec::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut current_rules = RobotsRuleSet::default();
    let mut group_has_rules = false;

    let save_group = |agents: &mut Vec<(String, RobotsRuleSet)>,
                       current_agents: &[String],
                       current_rules: &RobotsRuleSet| {
        for agent in current_agents {
            agents.push((agent.to_ascii_lowercase(), current_rules.clone()));
        }
    };

    for raw_line in content.lines() {
        let line = match raw_line.split('#').next() {
            Some(l) => l.trim(),
            None => continue,
        };
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                if group_has_rules {
                    save_group(&mut agents, &current_agents, &current_rules);
                    current_agents.clear();
                    current_rules = RobotsRuleSet::default();
                    group_has_rules = false;
                }
                current_agents.push(value.to_string());
            }
            "disallow" => {
                if !value.is_empty() {
                    current_rules.rules.push(RobotsRule {
                        path_pattern: value.to_string(),
                        allow: false,
                    });
                    group_has_rules = true;
                }
            }
            "allow" => {
                if !value.is_empty() {
                    current_rules.rules.push(RobotsRule {
                        path_pattern: value.to_string(),
                        allow: true,
                    });
                    group_has_rules = true;
                }
            }
            "crawl-delay" => {
                if let Ok(seconds) = value.parse::<f64>() {
                    current_rules.crawl_delay = Some(seconds);
                    group_has_rules = true;
                }
            }
            "sitemap" => sitemaps.push(value.to_string()),
            _ => {}
        }
    }
    if !current_agents.is_empty() {
        save_group(&mut agents, &current_agents, &current_rules);
    }

    RobotsFile { agents, sitemaps }
}

/// Process-lifetime robots.txt cache keyed by `{scheme}://{host}[:port]`.
pub struct RobotsCache {
    cache: DashMap<String, Arc<RobotsFile>>,
    fetcher: Arc<FetchEngine>,
}

const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);
const ROBOTS_USER_AGENT: &str = "dig-scraper/1.0";

impl RobotsCache {
    pub fn new(fetcher: Arc<FetchEngine>) -> Self {
        Self {
            cache: DashMap::new(),
            fetcher,
        }
    }

    fn origin_key(url: &Url) -> String {
        match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), url.host_str().unwrap_or(""), port),
            None => format!("{}://{}", url.scheme(), url.host_str().unwrap_or("")),
        }
    }

    pub async fn get(&self, page_url: &Url) -> Arc<RobotsFile> {
        let key = Self::origin_key(page_url);
        if let Some(existing) = self.cache.get(&key) {
            return existing.clone();
        }

        let robots_url = format!("{key}/robots.txt");
        let none_profile = AntiDetectionState {
            profile: AntiDetectionProfile::None,
            ..Default::default()
        };

        let parsed = match self
            .fetcher
            .fetch_raw(&robots_url, &none_profile, Some(ROBOTS_TIMEOUT))
            .await
        {
            Ok(result) if (200..300).contains(&result.status) => {
                debug!(url = %robots_url, "fetched robots.txt");
                parse_robots_txt(&result.body)
            }
            Ok(result) => {
                debug!(url = %robots_url, status = result.status, "robots.txt non-2xx, treating as allow-all");
                RobotsFile::default()
            }
            Err(err) => {
                warn!(url = %robots_url, error = %err, "robots.txt fetch failed, treating as allow-all");
                RobotsFile::default()
            }
        };

        let parsed = Arc::new(parsed);
        self.cache.insert(key, parsed.clone());
        parsed
    }

    pub async fn is_allowed(&self, page_url: &Url) -> bool {
        let robots = self.get(page_url).await;
        let path = path_with_query(page_url);
        robots.is_allowed(&path, ROBOTS_USER_AGENT)
    }

    pub async fn crawl_delay(&self, page_url: &Url) -> Option<f64> {
        let robots = self.get(page_url).await;
        robots.crawl_delay(ROBOTS_USER_AGENT)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

fn path_with_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_specific_match_prefers_longer_allow() {
        let robots = parse_robots_txt("User-agent: *\nDisallow: /admin/\nAllow: /admin/public/\n");
        assert!(robots.is_allowed("/admin/public/doc", "any-agent"));
        assert!(!robots.is_allowed("/admin/private", "any-agent"));
    }

    #[test]
    fn wildcard_suffix_anchors_end() {
        let robots = parse_robots_txt("User-agent: *\nDisallow: /*.pdf$\n");
        assert!(!robots.is_allowed("/files/report.pdf", "any-agent"));
        assert!(robots.is_allowed("/files/report.pdf.html", "any-agent"));
    }

    #[test]
    fn prefix_match_without_wildcard() {
        let robots = parse_robots_txt("User-agent: *\nDisallow: /foo\n");
        assert!(!robots.is_allowed("/foo", "any-agent"));
        assert!(!robots.is_allowed("/foo/", "any-agent"));
        assert!(!robots.is_allowed("/foo/bar", "any-agent"));
        assert!(robots.is_allowed("/other/path", "any-agent"));
    }

    #[test]
    fn no_matching_rule_defaults_to_allow() {
        let robots = parse_robots_txt("User-agent: *\nDisallow: /private\n");
        assert!(robots.is_allowed("/public", "any-agent"));
    }

    #[test]
    fn new_user_agent_line_after_rules_starts_new_group() {
        let robots = parse_robots_txt(
            "User-agent: Googlebot\nDisallow: /no-google\nUser-agent: *\nDisallow: /no-anyone\n",
        );
        assert!(robots.is_allowed("/no-google", "any-agent"));
        assert!(!robots.is_allowed("/no-anyone", "any-agent"));
    }
}
