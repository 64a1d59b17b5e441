//! Two-tier result caching.
//!
//! Assembled tables are cached under a [`Fingerprint`] of the query and
//! the permission filters that shaped it:
//!
//! ```text
//!   lookup ──> memory (generational) ──miss──> disk (content-addressed)
//!                    ^                                │ hit
//!                    └──────── promote ──────────────┘
//! ```
//!
//! The in-process tier holds encoded tables in two generations with a
//! rotation bound; the disk tier stores one lz4-compressed JSON file per
//! fingerprint and evicts oldest-first. Disk failures never surface to
//! callers, the tier just degrades to a miss.

mod fs;
mod generational;
mod key;

pub use fs::FsCache;
pub use generational::{CacheStats, GenerationalCache};
pub use key::Fingerprint;

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::query::Table;

// ============================================================================
// Encoding
// ============================================================================

/// Serialize a table to its cached byte form (JSON + lz4).
pub fn encode_table(table: &Table) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(table)?;
    Ok(compress_prepend_size(&json))
}

/// Decode bytes previously produced by [`encode_table`].
pub fn decode_table(bytes: &[u8]) -> Result<Table> {
    let json = decompress_size_prepended(bytes)
        .map_err(|err| Error::cache(format!("lz4 decompression failed: {err}")))?;
    Ok(serde_json::from_slice(&json)?)
}

// ============================================================================
// ResultCache
// ============================================================================

/// Facade over the memory and disk tiers.
#[derive(Debug)]
pub struct ResultCache {
    memory: GenerationalCache<Fingerprint, Vec<u8>>,
    disk: FsCache,
    enabled: bool,
}

impl ResultCache {
    /// Build both tiers from the cache section of the engine config.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            memory: GenerationalCache::new(config.memory_entries),
            disk: FsCache::new(config.root.clone(), config.max_entries),
            enabled: config.enabled,
        }
    }

    /// Look up an encoded table, promoting disk hits into memory.
    pub fn get(&self, key: &Fingerprint) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }
        if let Some(bytes) = self.memory.get(key) {
            debug!(key = %key, "memory cache hit");
            return Some(bytes);
        }
        let bytes = self.disk.get(key)?;
        self.memory.set(key.clone(), bytes.clone());
        Some(bytes)
    }

    /// Store an encoded table in both tiers.
    pub fn set(&self, key: &Fingerprint, bytes: Vec<u8>) {
        if !self.enabled {
            return;
        }
        self.disk.set(key, &bytes);
        self.memory.set(key.clone(), bytes);
    }

    /// Drop the memory tier and re-initialize the disk tier.
    ///
    /// With `clean` set the persistent entries are removed as well.
    pub fn reset(&self, clean: bool) {
        self.memory.clear();
        self.disk.reset(clean);
    }

    /// Whether caching is enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Snapshot of the memory tier's generation counters.
    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }
}

// ============================================================================
// Tests
// ============================================================================
