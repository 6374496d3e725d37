//! Bounded TTL cache for expensive admin read results.
//!
//! Entries expire at an absolute instant and are lazily removed on access.
//! When the cache is full, inserting a new key evicts the single
//! oldest-inserted entry (insertion order, not access order). The cache is a
//! pure optimization: it never fails, and a miss means the caller recomputes.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Process-wide memoization cache with absolute expiry and a bounded footprint.
///
/// Interior mutability keeps the read-modify-write sequence a single critical
/// section, so a shared `Arc<TtlCache<_>>` is safe across request handlers.
pub struct TtlCache<V> {
    entries: Mutex<IndexMap<String, CacheEntry<V>>>,
    max_entries: usize,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            max_entries,
            default_ttl,
        }
    }

    /// Returns the cached value if present and not expired.
    ///
    /// An expired entry is removed and reported as a miss, so an absent key is
    /// never confused with a stored-but-stale value.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if Instant::now() <= entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.shift_remove(key);
                None
            }
            None => None,
        }
    }

    /// Inserts or overwrites a value; `ttl` falls back to the default.
    ///
    /// Inserting a new key at capacity first evicts the oldest-inserted entry.
    /// Overwriting an existing key keeps its insertion position and evicts
    /// nothing, since the size does not grow.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let expires_at = Instant::now() + ttl.unwrap_or(self.default_ttl);

        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.shift_remove_index(0);
        }
        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Explicit invalidation of a single key.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().shift_remove(key).is_some()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
