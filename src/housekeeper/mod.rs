//! Size-based storage pruning and its lock/lifecycle rules.
//!
//! Grounded on `examples/original_source/app/management/storage_manager.py`
//! (`prune_size`, `_acquire_prune_lock`/`_release_prune_lock`) and
//! `examples/original_source/app/housekeeper.py` (the standalone interval
//! loop). The exclusive-create-then-reclaim-if-stale lock dance is carried
//! over using `std::fs::OpenOptions::create_new` in place of
//! `os.open(O_CREAT | O_EXCL)`.

use std::time::Duration;

use tracing::{info, warn};

use crate::session::{SessionStore, PRUNE_LOCK_FILE};

/// Mirrors storage_manager.py's three-way return code: `0` ok, `1` target
/// unmet or invalid input, `2` lock busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    Ok,
    TargetUnmet,
    LockBusy,
    InvalidInput,
}

impl PruneOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::TargetUnmet | Self::InvalidInput => 1,
            Self::LockBusy => 2,
        }
    }
}

struct LockGuard {
    path: std::path::PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn acquire_lock(store: &SessionStore, stale_seconds: u64) -> Option<LockGuard> {
    let lock_path = store.root().join(PRUNE_LOCK_FILE);
    let try_create = |path: &std::path::Path| {
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                write!(f, "pid={} started_at={}\n", std::process::id(), chrono::Utc::now().timestamp())
            })
    };

    if try_create(&lock_path).is_ok() {
        return Some(LockGuard { path: lock_path });
    }

    let age = std::fs::metadata(&lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .unwrap_or(Duration::ZERO);

    if age.as_secs() > stale_seconds {
        warn!(event = "housekeeper.lock_stale", age_seconds = age.as_secs(), stale_seconds, "reclaiming stale prune lock");
        let _ = std::fs::remove_file(&lock_path);
        if try_create(&lock_path).is_ok() {
            return Some(LockGuard { path: lock_path });
        }
    }

    warn!(event = "housekeeper.lock_busy", lock_path = %lock_path.display(), "prune lock held by another process");
    None
}

/// Deletes the oldest sessions (by `created_at`, then `guid`) until total
/// size is at or under `max_mb`, or everything eligible has been deleted.
pub fn prune_size(store: &SessionStore, max_mb: f64, group: Option<&str>, lock_stale_seconds: u64) -> PruneOutcome {
    if !max_mb.is_finite() || max_mb <= 0.0 {
        warn!(event = "housekeeper.invalid_max_mb", max_mb, "invalid prune threshold");
        return PruneOutcome::InvalidInput;
    }
    if lock_stale_seconds == 0 {
        warn!(event = "housekeeper.invalid_lock_stale_seconds", lock_stale_seconds, "invalid lock stale seconds");
        return PruneOutcome::InvalidInput;
    }

    let Some(_lock) = acquire_lock(store, lock_stale_seconds) else {
        return PruneOutcome::LockBusy;
    };

    let mut candidates = match store.prune_candidates(group) {
        Ok(c) => c,
        Err(e) => {
            warn!(event = "housekeeper.list_failed", error = %e, "failed to enumerate sessions for prune");
            return PruneOutcome::InvalidInput;
        }
    };

    if candidates.is_empty() {
        info!(event = "housekeeper.empty", "nothing to prune");
        return PruneOutcome::Ok;
    }

    candidates.sort_by(|a, b| (a.created_at.as_str(), a.guid.as_str()).cmp(&(b.created_at.as_str(), b.guid.as_str())));

    let anomalies = candidates.iter().filter(|c| c.anomaly).count();
    let mut total_size: u64 = candidates.iter().map(|c| c.size_bytes).sum();
    let target_bytes = (max_mb * 1024.0 * 1024.0) as u64;

    info!(
        event = "housekeeper.check",
        current_mb = total_size as f64 / (1024.0 * 1024.0),
        target_mb = max_mb,
        item_count = candidates.len(),
        anomalies,
        "prune usage check"
    );

    if total_size <= target_bytes {
        return PruneOutcome::Ok;
    }

    let mut deleted_count = 0u64;
    let mut deleted_bytes = 0u64;
    for candidate in &candidates {
        if total_size <= target_bytes {
            break;
        }
        match store.force_delete(&candidate.guid) {
            Ok(()) => {
                total_size = total_size.saturating_sub(candidate.size_bytes);
                deleted_bytes += candidate.size_bytes;
                deleted_count += 1;
                info!(event = "housekeeper.prune", guid = %candidate.guid, size = candidate.size_bytes, "pruned session");
            }
            Err(e) => {
                warn!(event = "housekeeper.delete_failed", guid = %candidate.guid, error = %e, "failed to delete session");
            }
        }
    }

    info!(
        event = "housekeeper.summary",
        deleted_count,
        freed_mb = deleted_bytes as f64 / (1024.0 * 1024.0),
        final_mb = total_size as f64 / (1024.0 * 1024.0),
        anomalies,
        "prune completed"
    );

    if total_size > target_bytes {
        warn!(event = "housekeeper.target_unmet", final_mb = total_size as f64 / (1024.0 * 1024.0), target_mb = max_mb, "prune could not reach target");
        PruneOutcome::TargetUnmet
    } else {
        PruneOutcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_when_under_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        store.create_session("small", "https://example.com", None, None).unwrap();
        assert_eq!(prune_size(&store, 500.0, None, 3600), PruneOutcome::Ok);
    }

    #[test]
    fn prunes_oldest_first_until_under_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        for _ in 0..5 {
            store.create_session(&"x".repeat(1000), "https://example.com", None, None).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        let outcome = prune_size(&store, 0.002, None, 3600);
        assert!(matches!(outcome, PruneOutcome::Ok | PruneOutcome::TargetUnmet));
        let remaining = store.list_sessions(None).unwrap();
        assert!(remaining.len() < 5);
    }

    #[test]
    fn rejects_invalid_max_mb() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        assert_eq!(prune_size(&store, 0.0, None, 3600), PruneOutcome::InvalidInput);
        assert_eq!(prune_size(&store, -1.0, None, 3600), PruneOutcome::InvalidInput);
    }

    #[test]
    fn busy_lock_yields_lock_busy() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let lock_path = dir.path().join(PRUNE_LOCK_FILE);
        std::fs::write(&lock_path, "pid=1 started_at=0").unwrap();
        assert_eq!(prune_size(&store, 1.0, None, 3600), PruneOutcome::LockBusy);
    }
}
