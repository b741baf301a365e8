//! Target URL sourcing for the simulator's consumers.
//!
//! Grounded on `examples/original_source/simulator/core/provider.py`: a
//! `sites.json` file grouped by country, a flat URL list, or an enumeration
//! of recorded fixture files under a directory.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Deserialize;

/// A single crawl target drawn from `sites.json`.
#[derive(Debug, Clone)]
pub struct Site {
    pub name: String,
    pub url: String,
    pub country: String,
}

/// Picks a target URL for one simulated request. Implementations must be
/// safe to share across consumer tasks.
pub trait UrlProvider: Send + Sync {
    fn choose_url(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to read sites file {path}: {message}")]
    Io { path: String, message: String },
    #[error("failed to parse sites file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("no valid sites found in {path}")]
    Empty { path: String },
    #[error("fixtures_dir does not exist: {path}")]
    FixturesMissing { path: String },
}

#[derive(Debug, Deserialize)]
struct RawSiteEntry {
    url: String,
    #[serde(default)]
    name: Option<String>,
}

/// Random draw over the sites declared in a `sites.json` file, grouped by
/// country.
pub struct SiteProvider {
    sites: Vec<Site>,
}

impl SiteProvider {
    pub fn load_from_file(path: &str) -> Result<Self, ProviderError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Io { path: path.to_string(), message: e.to_string() })?;
        let data: BTreeMap<String, Vec<RawSiteEntry>> =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse { path: path.to_string(), message: e.to_string() })?;

        let mut sites = Vec::new();
        for (country, entries) in data {
            for entry in entries {
                let url = entry.url.trim().to_string();
                if url.is_empty() {
                    continue;
                }
                let name = entry.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| url.clone());
                sites.push(Site { name, url, country: country.clone() });
            }
        }

        if sites.is_empty() {
            return Err(ProviderError::Empty { path: path.to_string() });
        }

        Ok(Self { sites })
    }

    pub fn urls(&self) -> Vec<String> {
        self.sites.iter().map(|s| s.url.clone()).collect()
    }
}

impl UrlProvider for SiteProvider {
    fn choose_url(&self) -> String {
        let idx = rand::rng().random_range(0..self.sites.len());
        self.sites[idx].url.clone()
    }
}

/// Random draw over an explicit list of URLs (fixture mode, or a hand-rolled
/// corpus).
pub struct UrlListProvider {
    urls: Vec<String>,
}

impl UrlListProvider {
    pub fn new(urls: Vec<String>) -> Result<Self, ProviderError> {
        if urls.is_empty() {
            return Err(ProviderError::Empty { path: "<urls>".to_string() });
        }
        Ok(Self { urls })
    }
}

impl UrlProvider for UrlListProvider {
    fn choose_url(&self) -> String {
        let idx = rand::rng().random_range(0..self.urls.len());
        self.urls[idx].clone()
    }
}

/// Always returns the same URL — used for `--target-url` single-target runs.
pub struct StaticUrlProvider(String);

impl StaticUrlProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }
}

impl UrlProvider for StaticUrlProvider {
    fn choose_url(&self) -> String {
        self.0.clone()
    }
}

/// Enumerate recorded `*.html` fixtures under `fixtures_dir`, mapped to
/// `base_url`-relative paths in sorted order.
pub fn build_fixture_urls(base_url: &str, fixtures_dir: &str) -> Result<Vec<String>, ProviderError> {
    let root = std::path::Path::new(fixtures_dir);
    if !root.exists() {
        return Err(ProviderError::FixturesMissing { path: fixtures_dir.to_string() });
    }

    let mut rel_paths = Vec::new();
    collect_html_files(root, root, &mut rel_paths);
    rel_paths.sort();

    let base = base_url.trim_end_matches('/');
    Ok(rel_paths.into_iter().map(|rel| format!("{base}/{rel}")).collect())
}

fn collect_html_files(root: &std::path::Path, dir: &std::path::Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_html_files(root, &path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some("html") {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_list_provider_rejects_empty() {
        assert!(UrlListProvider::new(vec![]).is_err());
    }

    #[test]
    fn url_list_provider_chooses_from_the_list() {
        let provider = UrlListProvider::new(vec!["https://a.test/".to_string(), "https://b.test/".to_string()]).unwrap();
        for _ in 0..20 {
            let url = provider.choose_url();
            assert!(url == "https://a.test/" || url == "https://b.test/");
        }
    }

    #[test]
    fn static_provider_always_returns_same_url() {
        let provider = StaticUrlProvider::new("https://example.com/");
        assert_eq!(provider.choose_url(), "https://example.com/");
        assert_eq!(provider.choose_url(), "https://example.com/");
    }
}
