//! Chunked, content-addressed session store.
//!
//! Grounded on `examples/original_source/app/session/manager.py` for the
//! operation set and chunk arithmetic, and on
//! `examples/original_source/app/management/storage_manager.py` for the
//! on-disk layout and anomaly accounting used by `stats()`/prune. Chunking
//! is character-based (`str::chars()`), never byte slicing, per
//! SPEC_FULL.md §9.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthError;
use crate::error::DigError;

pub const META_FILE: &str = "meta.json";
pub const BLOB_FILE: &str = "blob";
pub const PRUNE_LOCK_FILE: &str = ".prune_size.lock";

const DEFAULT_CHUNK_SIZE: usize = 4000;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {guid}")]
    NotFound { guid: String },
    #[error("invalid chunk index {chunk_index}, valid range is 0..{total_chunks}")]
    InvalidChunkIndex { chunk_index: i64, total_chunks: usize },
    #[error("content too large: {total_size_bytes} bytes")]
    ContentTooLarge { total_size_bytes: u64 },
    #[error("session store error: {message}")]
    Storage { message: String },
}

impl SessionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "SESSION_NOT_FOUND",
            Self::InvalidChunkIndex { .. } => "INVALID_CHUNK_INDEX",
            Self::ContentTooLarge { .. } => "CONTENT_TOO_LARGE",
            Self::Storage { .. } => "SESSION_ERROR",
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::NotFound { guid } => json!({ "session_id": guid }),
            Self::InvalidChunkIndex { chunk_index, total_chunks } => {
                json!({ "chunk_index": chunk_index, "total_chunks": total_chunks })
            }
            Self::ContentTooLarge { total_size_bytes } => {
                json!({ "total_size_bytes": total_size_bytes })
            }
            Self::Storage { message } => json!({ "message": message }),
        }
    }
}

/// Persisted record for one session, serialized verbatim as `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub guid: String,
    pub format: String,
    pub group: Option<String>,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub url: String,
    pub chunk_size: usize,
    pub total_chars: usize,
    pub total_chunks: usize,
}

fn total_chunks_for(total_chars: usize, chunk_size: usize) -> usize {
    if total_chars == 0 {
        1
    } else {
        total_chars.div_ceil(chunk_size)
    }
}

/// Diagnostic summary produced by `stats()`, grounded on
/// `storage_manager.py`'s `stats` CLI subcommand.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub item_count: usize,
    pub total_size_bytes: u64,
    pub groups: Vec<(String, usize)>,
    pub anomaly_count: usize,
    pub anomaly_bytes: u64,
}

/// A directory of `{guid}/{meta.json,blob}` entries under `root`.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn guid_dir(&self, guid: &str) -> PathBuf {
        self.root.join(guid)
    }

    fn load_metadata(&self, guid: &str) -> Option<SessionMetadata> {
        let path = self.guid_dir(guid).join(META_FILE);
        let raw = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Enforces §4.I's group rule: non-null metadata group must match a
    /// non-null caller group; a caller-supplied group is accepted against
    /// anonymous metadata (anonymous is public); an anonymous caller is
    /// accepted against owned metadata only when `auth_enabled` is false.
    fn check_group(
        metadata: &SessionMetadata,
        caller_group: Option<&str>,
        auth_enabled: bool,
    ) -> Result<(), AuthError> {
        match (&metadata.group, caller_group) {
            (Some(owner), Some(caller)) if owner != caller => {
                Err(AuthError::PermissionDenied {
                    message: format!("session is owned by group '{owner}'"),
                })
            }
            (Some(_), None) if auth_enabled => Err(AuthError::PermissionDenied {
                message: "session is group-owned; no token presented".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Stores `content` (already serialized to UTF-8 text) and returns the
    /// new session's guid.
    pub fn create_session(
        &self,
        text_content: &str,
        url: &str,
        group: Option<String>,
        chunk_size: Option<usize>,
    ) -> Result<String, DigError> {
        let guid = Uuid::new_v4().to_string();
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let total_chars = text_content.chars().count();
        let total_chunks = total_chunks_for(total_chars, chunk_size);
        let bytes = text_content.as_bytes();

        let metadata = SessionMetadata {
            guid: guid.clone(),
            format: "json".to_string(),
            group,
            created_at: Utc::now(),
            size_bytes: bytes.len() as u64,
            url: url.to_string(),
            chunk_size,
            total_chars,
            total_chunks,
        };

        let dir = self.guid_dir(&guid);
        std::fs::create_dir_all(&dir).map_err(|e| SessionError::Storage { message: e.to_string() })?;
        std::fs::write(dir.join(BLOB_FILE), bytes)
            .map_err(|e| SessionError::Storage { message: e.to_string() })?;
        let meta_json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| SessionError::Storage { message: e.to_string() })?;
        std::fs::write(dir.join(META_FILE), meta_json)
            .map_err(|e| SessionError::Storage { message: e.to_string() })?;

        info!(event = "session.created", guid = %guid, total_chunks, total_chars, "session stored");
        Ok(guid)
    }

    pub fn get_session_info(
        &self,
        guid: &str,
        caller_group: Option<&str>,
        auth_enabled: bool,
    ) -> Result<SessionMetadata, DigError> {
        let metadata = self
            .load_metadata(guid)
            .ok_or_else(|| SessionError::NotFound { guid: guid.to_string() })?;
        Self::check_group(&metadata, caller_group, auth_enabled)?;
        Ok(metadata)
    }

    pub fn get_chunk(
        &self,
        guid: &str,
        chunk_index: i64,
        caller_group: Option<&str>,
        auth_enabled: bool,
    ) -> Result<String, DigError> {
        let metadata = self.get_session_info(guid, caller_group, auth_enabled)?;
        if chunk_index < 0 || chunk_index as usize >= metadata.total_chunks {
            return Err(SessionError::InvalidChunkIndex {
                chunk_index,
                total_chunks: metadata.total_chunks,
            }
            .into());
        }

        let blob_path = self.guid_dir(guid).join(BLOB_FILE);
        let raw = std::fs::read(&blob_path).map_err(|e| SessionError::Storage { message: e.to_string() })?;
        let text = String::from_utf8(raw).map_err(|e| SessionError::Storage { message: e.to_string() })?;

        let chunk_index = chunk_index as usize;
        let start = chunk_index * metadata.chunk_size;
        let end = start + metadata.chunk_size;
        let chars: Vec<char> = text.chars().collect();
        let end = end.min(chars.len());
        let start = start.min(end);
        Ok(chars[start..end].iter().collect())
    }

    /// Full joined read subject to `max_bytes`.
    pub fn get_session(
        &self,
        guid: &str,
        max_bytes: Option<u64>,
        caller_group: Option<&str>,
        auth_enabled: bool,
    ) -> Result<String, DigError> {
        let metadata = self.get_session_info(guid, caller_group, auth_enabled)?;
        if let Some(max_bytes) = max_bytes {
            if metadata.size_bytes > max_bytes {
                return Err(SessionError::ContentTooLarge {
                    total_size_bytes: metadata.size_bytes,
                }
                .into());
            }
        }
        let blob_path = self.guid_dir(guid).join(BLOB_FILE);
        let raw = std::fs::read(&blob_path).map_err(|e| SessionError::Storage { message: e.to_string() })?;
        String::from_utf8(raw).map_err(|e| SessionError::Storage { message: e.to_string() }.into())
    }

    pub fn list_sessions(&self, group: Option<&str>) -> Result<Vec<SessionMetadata>, DigError> {
        let mut out = Vec::new();
        for entry in self.iter_metadata()? {
            if let Some(group) = group {
                if entry.group.as_deref() != Some(group) {
                    continue;
                }
            }
            out.push(entry);
        }
        Ok(out)
    }

    pub fn delete(&self, guid: &str, caller_group: Option<&str>, auth_enabled: bool) -> Result<bool, DigError> {
        let Some(metadata) = self.load_metadata(guid) else {
            return Ok(false);
        };
        Self::check_group(&metadata, caller_group, auth_enabled)?;
        let dir = self.guid_dir(guid);
        std::fs::remove_dir_all(&dir).map_err(|e| SessionError::Storage { message: e.to_string() })?;
        Ok(true)
    }

    /// Every guid directory under the root, whether or not it has valid
    /// metadata (an anomaly if not).
    fn iter_guid_dirs(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }

    fn iter_metadata(&self) -> Result<Vec<SessionMetadata>, DigError> {
        let dirs = self
            .iter_guid_dirs()
            .map_err(|e| SessionError::Storage { message: e.to_string() })?;
        let mut out = Vec::new();
        for dir in dirs {
            let guid = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if let Some(meta) = self.load_metadata(guid) {
                out.push(meta);
            }
        }
        Ok(out)
    }

    /// Diagnostic used by both `list_sessions`/prune callers and the
    /// housekeeper: counts directories with a missing `meta.json` as
    /// anomalies, estimating their size from the on-disk `blob` file.
    pub fn stats(&self, group: Option<&str>) -> Result<StorageStats, DigError> {
        let dirs = self
            .iter_guid_dirs()
            .map_err(|e| SessionError::Storage { message: e.to_string() })?;

        let mut item_count = 0;
        let mut total_size_bytes = 0u64;
        let mut group_counts: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
        let mut anomaly_count = 0;
        let mut anomaly_bytes = 0u64;

        for dir in dirs {
            let guid = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match self.load_metadata(guid) {
                Some(meta) => {
                    if let Some(group) = group {
                        if meta.group.as_deref() != Some(group) {
                            continue;
                        }
                    }
                    item_count += 1;
                    total_size_bytes += meta.size_bytes;
                    let key = meta.group.clone().unwrap_or_else(|| "none".to_string());
                    *group_counts.entry(key).or_insert(0) += 1;
                }
                None => {
                    let blob_size = std::fs::metadata(dir.join(BLOB_FILE)).map(|m| m.len()).unwrap_or(0);
                    anomaly_count += 1;
                    anomaly_bytes += blob_size;
                    total_size_bytes += blob_size;
                    warn!(event = "session.metadata_missing", guid = %guid, estimated_size = blob_size, "anomalous session directory");
                }
            }
        }

        Ok(StorageStats {
            item_count,
            total_size_bytes,
            groups: group_counts.into_iter().collect(),
            anomaly_count,
            anomaly_bytes,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// One entry per guid directory, whether or not it has valid metadata,
    /// for the housekeeper's prune pass. Anomalous directories (no
    /// `meta.json`) get an empty `created_at` so they sort first (oldest).
    pub fn prune_candidates(&self, group: Option<&str>) -> Result<Vec<PruneCandidate>, DigError> {
        let dirs = self
            .iter_guid_dirs()
            .map_err(|e| SessionError::Storage { message: e.to_string() })?;
        let mut out = Vec::new();
        for dir in dirs {
            let guid = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
            match self.load_metadata(&guid) {
                Some(meta) => {
                    if let Some(group) = group {
                        if meta.group.as_deref() != Some(group) {
                            continue;
                        }
                    }
                    out.push(PruneCandidate {
                        guid,
                        created_at: meta.created_at.to_rfc3339(),
                        size_bytes: meta.size_bytes,
                        anomaly: false,
                    });
                }
                None => {
                    let size_bytes = std::fs::metadata(dir.join(BLOB_FILE)).map(|m| m.len()).unwrap_or(0);
                    out.push(PruneCandidate {
                        guid,
                        created_at: String::new(),
                        size_bytes,
                        anomaly: true,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Removes a guid directory unconditionally, bypassing the group check
    /// — only the housekeeper's internal prune loop should call this.
    pub fn force_delete(&self, guid: &str) -> std::io::Result<()> {
        std::fs::remove_dir_all(self.guid_dir(guid))
    }
}

/// One prune-eligible item, as seen by the housekeeper.
#[derive(Debug, Clone)]
pub struct PruneCandidate {
    pub guid: String,
    pub created_at: String,
    pub size_bytes: u64,
    pub anomaly: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn round_trip_through_chunks_reproduces_text() {
        let (store, _dir) = store();
        let text = "héllo wörld, ".repeat(50);
        let guid = store.create_session(&text, "https://example.com", None, Some(7)).unwrap();
        let info = store.get_session_info(&guid, None, false).unwrap();

        let mut joined = String::new();
        for i in 0..info.total_chunks {
            joined.push_str(&store.get_chunk(&guid, i as i64, None, false).unwrap());
        }
        assert_eq!(joined, text);
    }

    #[test]
    fn unknown_guid_is_not_found() {
        let (store, _dir) = store();
        let err = store.get_session_info("no-such-guid", None, false).unwrap_err();
        assert_eq!(err.error_code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn out_of_range_chunk_index_is_rejected() {
        let (store, _dir) = store();
        let guid = store.create_session("short", "https://example.com", None, None).unwrap();
        let err = store.get_chunk(&guid, 1, None, false).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CHUNK_INDEX");
        let err = store.get_chunk(&guid, -1, None, false).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CHUNK_INDEX");
    }

    #[test]
    fn group_mismatch_is_permission_denied() {
        let (store, _dir) = store();
        let guid = store
            .create_session("data", "https://example.com", Some("apac".to_string()), None)
            .unwrap();
        let err = store.get_session_info(&guid, Some("emea"), true).unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_DENIED");

        let ok = store.get_session_info(&guid, Some("apac"), true);
        assert!(ok.is_ok());
    }

    #[test]
    fn anonymous_caller_is_denied_when_auth_enabled() {
        let (store, _dir) = store();
        let guid = store
            .create_session("data", "https://example.com", Some("apac".to_string()), None)
            .unwrap();
        let err = store.get_session_info(&guid, None, true).unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_DENIED");

        let ok = store.get_session_info(&guid, None, false);
        assert!(ok.is_ok());
    }

    #[test]
    fn stats_counts_anomalous_directories() {
        let (store, dir) = store();
        store.create_session("abc", "https://example.com", None, None).unwrap();

        let anomaly_dir = dir.path().join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&anomaly_dir).unwrap();
        std::fs::write(anomaly_dir.join(BLOB_FILE), b"orphaned").unwrap();

        let stats = store.stats(None).unwrap();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.anomaly_count, 1);
        assert_eq!(stats.anomaly_bytes, 8);
    }

    proptest::proptest! {
        #[test]
        fn chunking_round_trip_holds_for_arbitrary_text_and_chunk_size(
            text in ".{0,500}",
            chunk_size in 1usize..97,
        ) {
            let (store, _dir) = store();
            let guid = store.create_session(&text, "https://example.com", None, Some(chunk_size)).unwrap();
            let info = store.get_session_info(&guid, None, false).unwrap();

            let expected_chunks = text.chars().count().div_ceil(chunk_size).max(1);
            prop_assert_eq!(info.total_chunks, expected_chunks);

            let mut joined = String::new();
            for i in 0..info.total_chunks {
                joined.push_str(&store.get_chunk(&guid, i as i64, None, false).unwrap());
            }
            prop_assert_eq!(joined, text);
        }
    }
}
