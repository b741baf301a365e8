//! Fixture recording: fetch live sites, obfuscate, and persist as replayable
//! HTML fixtures plus a `meta.json` manifest.
//!
//! Grounded on `examples/original_source/simulator/fixtures/storage.py`
//! (the on-disk fixture layout) and
//! `examples/original_source/simulator/recording/recorder.py` (the
//! fetch-obfuscate-write loop). The recorder never touches the production
//! `FetchEngine`/session store; it runs its own short-lived `reqwest` client
//! with a recorder-specific User-Agent, the same way the distilled source
//! keeps recording traffic distinguishable from production traffic.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::obfuscator::obfuscate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub path: String,
    pub content_type: String,
    pub original_status: u16,
    pub size_bytes: usize,
    pub obfuscated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteMeta {
    pub slug: String,
    pub original_url: String,
    pub files: Vec<FileMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMeta {
    pub version: u32,
    pub recorded_at: String,
    #[serde(default)]
    pub sites: Vec<SiteMeta>,
}

/// Manages the fixture data directory layout: one subdirectory per recorded
/// site slug, holding `index.html`, plus a top-level `meta.json` manifest.
pub struct FixtureStore {
    data_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum FixtureStoreError {
    #[error("failed to create fixture directory {path}: {message}")]
    CreateDir { path: String, message: String },
    #[error("failed to write fixture file {path}: {message}")]
    Write { path: String, message: String },
    #[error("meta.json not found under {path}")]
    MetaMissing { path: String },
    #[error("failed to read/parse meta.json under {path}: {message}")]
    MetaInvalid { path: String, message: String },
}

impl FixtureStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn meta_path(&self) -> PathBuf {
        self.data_dir.join("meta.json")
    }

    pub fn ensure_dirs(&self) -> Result<(), FixtureStoreError> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| FixtureStoreError::CreateDir { path: self.data_dir.display().to_string(), message: e.to_string() })
    }

    pub fn site_dir(&self, slug: &str) -> Result<PathBuf, FixtureStoreError> {
        let path = self.data_dir.join(slug);
        std::fs::create_dir_all(&path)
            .map_err(|e| FixtureStoreError::CreateDir { path: path.display().to_string(), message: e.to_string() })?;
        Ok(path)
    }

    pub fn write_file(&self, slug: &str, filename: &str, content: &[u8]) -> Result<PathBuf, FixtureStoreError> {
        let site_path = self.site_dir(slug)?;
        let file_path = site_path.join(filename);
        std::fs::write(&file_path, content)
            .map_err(|e| FixtureStoreError::Write { path: file_path.display().to_string(), message: e.to_string() })?;
        Ok(file_path)
    }

    pub fn write_meta(&self, meta: &RecordingMeta) -> Result<(), FixtureStoreError> {
        self.ensure_dirs()?;
        let json = serde_json::to_string_pretty(meta).unwrap_or_else(|_| "{}".to_string());
        std::fs::write(self.meta_path(), json)
            .map_err(|e| FixtureStoreError::Write { path: self.meta_path().display().to_string(), message: e.to_string() })
    }

    pub fn load_meta(&self) -> Result<RecordingMeta, FixtureStoreError> {
        let path = self.meta_path();
        if !path.exists() {
            return Err(FixtureStoreError::MetaMissing { path: self.data_dir.display().to_string() });
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| FixtureStoreError::MetaInvalid { path: path.display().to_string(), message: e.to_string() })?;
        serde_json::from_str(&text)
            .map_err(|e| FixtureStoreError::MetaInvalid { path: path.display().to_string(), message: e.to_string() })
    }

    pub fn now_iso() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

/// Convert a URL to a filesystem-safe slug, e.g.
/// `https://asia.nikkei.com` -> `asia_nikkei_com`.
pub fn url_to_slug(url: &str) -> String {
    let without_scheme = url.trim_start_matches("https://").trim_start_matches("http://");
    let trimmed = without_scheme.trim_end_matches('/');
    let mut slug = String::with_capacity(trimmed.len());
    let mut last_was_sep = false;
    for ch in trimmed.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    let trimmed_slug = slug.trim_matches('_').to_string();
    if trimmed_slug.is_empty() { "unknown".to_string() } else { trimmed_slug }
}

#[derive(Debug, Default)]
pub struct RecordResult {
    pub sites_attempted: u32,
    pub sites_recorded: u32,
    pub sites_failed: u32,
    pub total_bytes: u64,
}

pub struct Recorder {
    store: FixtureStore,
    client: reqwest::Client,
}

impl Recorder {
    pub fn new(store: FixtureStore, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent("dig-simulator-recorder/0.1")
            .build()?;
        Ok(Self { store, client })
    }

    pub async fn record_urls(&self, urls: &[String]) -> Result<RecordResult, FixtureStoreError> {
        self.store.ensure_dirs()?;
        let mut result = RecordResult::default();
        let mut meta = RecordingMeta { version: 1, recorded_at: FixtureStore::now_iso(), sites: Vec::new() };

        for url in urls {
            result.sites_attempted += 1;
            match self.record_one(url).await {
                Ok(site_meta) => {
                    for file in &site_meta.files {
                        result.total_bytes += file.size_bytes as u64;
                    }
                    meta.sites.push(site_meta);
                    result.sites_recorded += 1;
                }
                Err(err) => {
                    result.sites_failed += 1;
                    tracing::warn!(event = "recorder.site_failed", url = %url, error = %err, "recording failed for site");
                }
            }
        }

        self.store.write_meta(&meta)?;
        tracing::info!(
            event = "recorder.complete",
            sites_attempted = result.sites_attempted,
            sites_recorded = result.sites_recorded,
            sites_failed = result.sites_failed,
            total_bytes = result.total_bytes,
            "recording run complete"
        );
        Ok(result)
    }

    async fn record_one(&self, url: &str) -> Result<SiteMeta, String> {
        let slug = url_to_slug(url);
        tracing::info!(event = "recorder.fetching", url = %url, slug = %slug, "fetching site for recording");

        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let raw_html = response.text().await.map_err(|e| e.to_string())?;
        let obfuscated = obfuscate(&raw_html);
        let content_bytes = obfuscated.into_bytes();

        self.store
            .write_file(&slug, "index.html", &content_bytes)
            .map_err(|e| e.to_string())?;

        let file_meta = FileMeta {
            path: "index.html".to_string(),
            content_type,
            original_status: status,
            size_bytes: content_bytes.len(),
            obfuscated: true,
        };

        tracing::info!(
            event = "recorder.site_saved",
            url = %url,
            slug = %slug,
            status,
            size_bytes = content_bytes.len(),
            "site recorded"
        );

        Ok(SiteMeta { slug, original_url: url.to_string(), files: vec![file_meta] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_to_slug_strips_scheme_and_collapses_separators() {
        assert_eq!(url_to_slug("https://asia.nikkei.com"), "asia_nikkei_com");
        assert_eq!(url_to_slug("https://www.scmp.com/business/"), "www_scmp_com_business");
    }

    #[test]
    fn url_to_slug_falls_back_to_unknown() {
        assert_eq!(url_to_slug("https://"), "unknown");
    }

    #[test]
    fn fixture_store_round_trips_meta() {
        let dir = tempfile::tempdir().unwrap();
        let store = FixtureStore::new(dir.path());
        let meta = RecordingMeta {
            version: 1,
            recorded_at: "2026-01-01T00:00:00Z".to_string(),
            sites: vec![SiteMeta {
                slug: "example_com".to_string(),
                original_url: "https://example.com".to_string(),
                files: vec![FileMeta {
                    path: "index.html".to_string(),
                    content_type: "text/html".to_string(),
                    original_status: 200,
                    size_bytes: 42,
                    obfuscated: true,
                }],
            }],
        };
        store.write_meta(&meta).unwrap();
        let loaded = store.load_meta().unwrap();
        assert_eq!(loaded.sites.len(), 1);
        assert_eq!(loaded.sites[0].slug, "example_com");
    }
}
