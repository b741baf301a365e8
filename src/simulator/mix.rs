//! Consumer mix file: a weighted distribution over caller identities/groups
//! and tool choices.
//!
//! Grounded on `examples/original_source/simulator/core/mix.py`. Shape:
//! `{"groups": {"apac": {"count": 5, "token": "token_apac"}, "public": {"count": 2, "token": null}}}`.
//! `token` is either absent/null (anonymous), a literal token string, or a
//! symbolic name (`token_apac`, `token_invalid`, ...) resolved by the engine.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct MixEntry {
    pub name: String,
    pub count: u32,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MixConfig {
    pub entries: Vec<MixEntry>,
}

impl MixConfig {
    pub fn total_consumers(&self) -> u32 {
        self.entries.iter().map(|e| e.count).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MixError {
    #[error("failed to read mix file {path}: {message}")]
    Io { path: String, message: String },
    #[error("failed to parse mix file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("mix file must contain a non-empty 'groups' object")]
    EmptyGroups,
    #[error("mix entry {name:?} has invalid count: {count}")]
    InvalidCount { name: String, count: i64 },
    #[error("mix file must include at least one entry with count > 0")]
    NoEntries,
}

#[derive(Debug, Deserialize)]
struct RawMixFile {
    groups: BTreeMap<String, RawMixEntry>,
}

#[derive(Debug, Deserialize)]
struct RawMixEntry {
    count: i64,
    #[serde(default)]
    token: Option<String>,
}

pub fn load_mix_file(path: &str) -> Result<MixConfig, MixError> {
    let text = std::fs::read_to_string(Path::new(path))
        .map_err(|e| MixError::Io { path: path.to_string(), message: e.to_string() })?;
    let raw: RawMixFile =
        serde_json::from_str(&text).map_err(|e| MixError::Parse { path: path.to_string(), message: e.to_string() })?;

    if raw.groups.is_empty() {
        return Err(MixError::EmptyGroups);
    }

    let mut entries = Vec::new();
    for (name, entry) in raw.groups {
        if entry.count < 0 {
            return Err(MixError::InvalidCount { name, count: entry.count });
        }
        if entry.count == 0 {
            continue;
        }
        entries.push(MixEntry { name, count: entry.count as u32, token: entry.token });
    }

    if entries.is_empty() {
        return Err(MixError::NoEntries);
    }

    Ok(MixConfig { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_well_formed_mix_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"groups": {{"apac": {{"count": 5, "token": "token_apac"}}, "public": {{"count": 2}}}}}}"#
        )
        .unwrap();
        let mix = load_mix_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(mix.total_consumers(), 7);
    }

    #[test]
    fn zero_count_entries_are_dropped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"groups": {{"apac": {{"count": 0}}, "us": {{"count": 1}}}}}}"#).unwrap();
        let mix = load_mix_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(mix.entries.len(), 1);
        assert_eq!(mix.entries[0].name, "us");
    }

    #[test]
    fn rejects_all_zero_mix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"groups": {{"apac": {{"count": 0}}}}}}"#).unwrap();
        let err = load_mix_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, MixError::NoEntries));
    }
}
