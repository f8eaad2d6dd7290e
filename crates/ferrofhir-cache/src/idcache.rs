//! A bounded, internally synchronized name-to-id cache.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Probability (1/N) of running a shrink pass on an over-capacity insert.
const SHRINK_PROBABILITY: u32 = 100;

/// Hard capacity multiplier - force a shrink when exceeding this.
const HARD_CAPACITY_MULTIPLIER: f32 = 1.5;

/// A size-bounded map from keys to database ids.
///
/// Ids are immutable once assigned, so entries never go stale; the bound
/// exists purely to cap memory. Capacity is soft: inserts above the bound
/// trigger a probabilistic shrink pass, and crossing 1.5x the bound forces
/// one. Eviction order is arbitrary - any entry is safe to drop because a
/// miss only costs a database lookup.
#[derive(Debug)]
pub struct IdCache<K: Eq + Hash + Clone> {
    map: DashMap<K, i64>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// A point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl<K: Eq + Hash + Clone> IdCache<K> {
    /// Creates a cache with the given soft capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            map: DashMap::with_capacity(capacity.min(1024)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up the id for a key.
    pub fn get(&self, key: &K) -> Option<i64> {
        match self.map.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(*entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts an id, shrinking first when over capacity.
    pub fn insert(&self, key: K, id: i64) {
        let len = self.map.len();
        if len >= self.capacity {
            let hard_limit = (self.capacity as f32 * HARD_CAPACITY_MULTIPLIER) as usize;
            if len >= hard_limit || fastrand::u32(0..SHRINK_PROBABILITY) == 0 {
                self.shrink();
            }
        }
        self.map.insert(key, id);
    }

    /// Removes entries until the cache is back under its soft capacity.
    pub fn shrink(&self) {
        let excess = self.map.len().saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        let victims: Vec<K> = self
            .map
            .iter()
            .take(excess)
            .map(|entry| entry.key().clone())
            .collect();
        for key in victims {
            self.map.remove(&key);
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.map.clear();
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.map.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_insert() {
        let cache = IdCache::new(10);
        assert_eq!(cache.get(&"Patient".to_string()), None);

        cache.insert("Patient".to_string(), 1);
        assert_eq!(cache.get(&"Patient".to_string()), Some(1));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_hard_limit_forces_shrink() {
        let cache = IdCache::new(4);
        for i in 0..20 {
            cache.insert(format!("key{i}"), i);
        }
        // The hard limit is 1.5x capacity; inserts beyond it always shrink
        // back under the soft bound first.
        assert!(cache.len() <= 7, "len = {}", cache.len());
    }

    #[test]
    fn test_shrink_is_noop_under_capacity() {
        let cache = IdCache::new(10);
        cache.insert("a".to_string(), 1);
        cache.shrink();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = IdCache::new(10);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
