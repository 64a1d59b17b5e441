//! Filesystem-backed content-addressed cache tier.
//!
//! One file per entry, named by the hex fingerprint of the query that
//! produced it. The tier is strictly best-effort:
//!
//! - No root directory configured: every operation is a no-op.
//! - Any IO failure degrades to a miss (logged at warn), never an error.
//! - Reads touch the file's mtime so eviction approximates LRU.
//! - After each write, if the entry count exceeds the bound the single
//!   oldest file by mtime is removed.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::cache::key::Fingerprint;

// ============================================================================
// FsCache
// ============================================================================

/// Persistent cache of encoded result tables under a root directory.
#[derive(Debug)]
pub struct FsCache {
    root: Option<PathBuf>,
    max_entries: usize,
}

impl FsCache {
    /// Open (and if necessary create) the cache directory.
    ///
    /// Passing `None` as root yields a passthrough cache that stores
    /// nothing. The directory is created eagerly so later writes only
    /// have to deal with per-file errors.
    pub fn new(root: Option<PathBuf>, max_entries: usize) -> Self {
        let cache = Self {
            root,
            max_entries: max_entries.max(1),
        };
        cache.reset(false);
        cache
    }

    /// Whether this tier actually persists anything.
    pub fn is_active(&self) -> bool {
        self.root.is_some()
    }

    /// Look up an entry, returning the stored bytes on a hit.
    ///
    /// A hit refreshes the file's modification time so that recently
    /// read entries are not the first eviction victims.
    pub fn get(&self, key: &Fingerprint) -> Option<Vec<u8>> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => {
                touch(&path);
                debug!(key = %key, size = bytes.len(), "disk cache hit");
                Some(bytes)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(key = %key, error = %err, "disk cache read failed");
                None
            }
        }
    }

    /// Store an entry, then evict the oldest file if over the bound.
    pub fn set(&self, key: &Fingerprint, bytes: &[u8]) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        if let Err(err) = fs::write(&path, bytes) {
            warn!(key = %key, error = %err, "disk cache write failed");
            return;
        }
        self.evict_if_full();
    }

    /// Number of entries currently on disk.
    pub fn len(&self) -> usize {
        self.root
            .as_deref()
            .and_then(|root| list_entries(root).ok())
            .map_or(0, |entries| entries.len())
    }

    /// True when the cache holds no entries (or has no root).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recreate the cache directory, optionally dropping its contents.
    ///
    /// With `clean` set, everything under the root is removed first.
    /// Safe to call repeatedly; a missing directory is not an error.
    pub fn reset(&self, clean: bool) {
        let Some(root) = self.root.as_deref() else {
            return;
        };
        if clean {
            match fs::remove_dir_all(root) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(root = %root.display(), error = %err, "disk cache clean failed"),
            }
        }
        if let Err(err) = fs::create_dir_all(root) {
            warn!(root = %root.display(), error = %err, "disk cache root creation failed");
        }
    }

    fn entry_path(&self, key: &Fingerprint) -> Option<PathBuf> {
        self.root.as_deref().map(|root| root.join(key.as_str()))
    }

    fn evict_if_full(&self) {
        let Some(root) = self.root.as_deref() else {
            return;
        };
        let entries = match list_entries(root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "disk cache scan failed");
                return;
            }
        };
        if entries.len() <= self.max_entries {
            return;
        }
        if let Some((path, _)) = entries.into_iter().min_by_key(|(_, mtime)| *mtime) {
            match fs::remove_file(&path) {
                Ok(()) => debug!(victim = %path.display(), "disk cache evicted oldest entry"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(victim = %path.display(), error = %err, "disk cache eviction failed"),
            }
        }
    }
}

/// Refresh a file's modification time; failures are ignored.
fn touch(path: &Path) {
    if let Ok(file) = File::options().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}

fn list_entries(root: &Path) -> std::io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let mtime = entry
            .metadata()?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((entry.path(), mtime));
    }
    Ok(entries)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::DiceQuery;
    use crate::types::Coordinate;

    fn key(measure: &str) -> Fingerprint {
        let query = DiceQuery::new(
            vec![measure.to_string()],
            vec![Coordinate::new("date", vec![None])],
        );
        Fingerprint::of(&query, &[]).unwrap()
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Some(dir.path().to_path_buf()), 10);

        let k = key("sales.amount");
        assert_eq!(cache.get(&k), None);
        cache.set(&k, b"payload");
        assert_eq!(cache.get(&k), Some(b"payload".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_root_is_passthrough() {
        let cache = FsCache::new(None, 10);
        let k = key("sales.amount");
        cache.set(&k, b"payload");
        assert_eq!(cache.get(&k), None);
        assert!(!cache.is_active());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_removes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Some(dir.path().to_path_buf()), 2);

        let first = key("sales.first");
        let second = key("sales.second");
        let third = key("sales.third");

        cache.set(&first, b"a");
        std::thread::sleep(std::time::Duration::from_millis(20));
        cache.set(&second, b"b");
        std::thread::sleep(std::time::Duration::from_millis(20));
        cache.set(&third, b"c");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&first), None);
        assert_eq!(cache.get(&second), Some(b"b".to_vec()));
        assert_eq!(cache.get(&third), Some(b"c".to_vec()));
    }

    #[test]
    fn test_reset_clean_drops_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Some(dir.path().to_path_buf()), 10);

        cache.set(&key("sales.amount"), b"payload");
        assert_eq!(cache.len(), 1);

        cache.reset(true);
        assert_eq!(cache.len(), 0);
        // idempotent
        cache.reset(true);
        cache.reset(false);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_unreadable_entry_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(Some(dir.path().to_path_buf()), 10);

        let k = key("sales.amount");
        // a directory where the entry file should be makes reads fail
        fs::create_dir(dir.path().join(k.as_str())).unwrap();
        assert_eq!(cache.get(&k), None);
    }
}
