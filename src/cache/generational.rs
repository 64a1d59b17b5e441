//! Bounded in-process generational cache
//!
//! Two generations, "fresh" and "stale". Reads hit fresh first and promote
//! stale entries back into fresh. When fresh grows past capacity the whole
//! fresh map is demoted to stale and the previous stale generation is
//! discarded wholesale. That makes eviction O(1) amortized at the cost of
//! approximate (not strict) LRU behavior.
//!
//! A single coarse lock guards both generations; get and set are mutually
//! exclusive at call granularity, which is all the pipeline requires.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

/// A cached value with its creation timestamp
#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    created_at: i64,
}

impl<V> Entry<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            created_at: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug)]
struct Generations<K, V> {
    fresh: HashMap<K, Entry<V>>,
    stale: HashMap<K, Entry<V>>,
}

/// Point-in-time counters for the two generations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently in the fresh generation
    pub fresh_entries: usize,
    /// Entries currently in the stale generation
    pub stale_entries: usize,
    /// Creation time (unix millis) of the oldest live entry, if any
    pub oldest_created_at: Option<i64>,
}

/// Two-generation bounded cache with O(1) amortized eviction
#[derive(Debug)]
pub struct GenerationalCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    generations: Mutex<Generations<K, V>>,
    capacity: usize,
}

impl<K, V> GenerationalCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding up to `capacity` entries per generation
    pub fn new(capacity: usize) -> Self {
        Self {
            generations: Mutex::new(Generations {
                fresh: HashMap::new(),
                stale: HashMap::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Look up a key, promoting stale hits into the fresh generation
    pub fn get(&self, key: &K) -> Option<V> {
        let mut generations = self.generations.lock();
        if let Some(entry) = generations.fresh.get(key) {
            return Some(entry.value.clone());
        }
        if let Some(entry) = generations.stale.remove(key) {
            let value = entry.value.clone();
            self.insert_fresh(&mut generations, key.clone(), entry);
            return Some(value);
        }
        None
    }

    /// Insert a value into the fresh generation
    pub fn set(&self, key: K, value: V) {
        let mut generations = self.generations.lock();
        self.insert_fresh(&mut generations, key, Entry::new(value));
    }

    /// Drop both generations
    pub fn clear(&self) {
        let mut generations = self.generations.lock();
        generations.fresh.clear();
        generations.stale.clear();
    }

    /// Entry count across generations; keys live in at most one of them
    /// except briefly after a set that shadows a stale entry
    pub fn len(&self) -> usize {
        let generations = self.generations.lock();
        generations.fresh.len() + generations.stale.len()
    }

    /// True when both generations are empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the generation sizes and the age of the oldest entry
    pub fn stats(&self) -> CacheStats {
        let generations = self.generations.lock();
        let oldest_created_at = generations
            .fresh
            .values()
            .chain(generations.stale.values())
            .map(|entry| entry.created_at)
            .min();
        CacheStats {
            fresh_entries: generations.fresh.len(),
            stale_entries: generations.stale.len(),
            oldest_created_at,
        }
    }

    fn insert_fresh(&self, generations: &mut Generations<K, V>, key: K, entry: Entry<V>) {
        generations.fresh.insert(key, entry);
        if generations.fresh.len() > self.capacity {
            // rotate: fresh becomes stale, the old stale generation is
            // discarded rather than merged
            generations.stale = std::mem::take(&mut generations.fresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let cache: GenerationalCache<String, u32> = GenerationalCache::new(4);
        cache.set("a".into(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);
    }

    #[test]
    fn test_rotation_keeps_recent_generation() {
        let cache: GenerationalCache<u32, u32> = GenerationalCache::new(2);
        cache.set(1, 1);
        cache.set(2, 2);
        // third insert overflows fresh; {1,2,3} rotates into stale
        cache.set(3, 3);

        // all three still reachable from the stale generation
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn test_second_rotation_discards_stale() {
        let cache: GenerationalCache<u32, u32> = GenerationalCache::new(2);
        cache.set(1, 1);
        cache.set(2, 2);
        cache.set(3, 3); // rotation #1: stale = {1,2,3}
        cache.set(4, 4);
        cache.set(5, 5);
        cache.set(6, 6); // rotation #2: stale = {4,5,6}, {1,2,3} discarded

        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&3), None);
        assert_eq!(cache.get(&5), Some(5));
    }

    #[test]
    fn test_stats_track_generations_and_age() {
        let cache: GenerationalCache<u32, u32> = GenerationalCache::new(2);
        assert_eq!(cache.stats().oldest_created_at, None);

        cache.set(1, 1);
        cache.set(2, 2);
        cache.set(3, 3); // rotation: all three in stale

        let stats = cache.stats();
        assert_eq!(stats.fresh_entries, 0);
        assert_eq!(stats.stale_entries, 3);
        let oldest = stats.oldest_created_at.unwrap();

        // promoting an entry keeps its original timestamp
        assert_eq!(cache.get(&1), Some(1));
        let stats = cache.stats();
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(stats.stale_entries, 2);
        assert_eq!(stats.oldest_created_at, Some(oldest));

        cache.clear();
        assert_eq!(cache.stats().oldest_created_at, None);
    }

    #[test]
    fn test_promotion_survives_rotation() {
        let cache: GenerationalCache<u32, u32> = GenerationalCache::new(2);
        cache.set(1, 1);
        cache.set(2, 2);
        cache.set(3, 3); // stale = {1,2,3}, fresh empty

        // reading 1 promotes it into fresh
        assert_eq!(cache.get(&1), Some(1));

        cache.set(4, 4);
        cache.set(5, 5); // fresh {1,4,5} overflows and rotates, {2,3} discarded

        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&2), None);
    }

    #[test]
    fn test_clear() {
        let cache: GenerationalCache<u32, u32> = GenerationalCache::new(2);
        cache.set(1, 1);
        cache.set(2, 2);
        cache.set(3, 3);
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&3), None);
    }
}
