//! Bounded memoization cache for expensive inference results.
//!
//! Embedding and feature extraction are orders of magnitude more
//! expensive than a map lookup, and uploads repeat (same image, same
//! content hash), so results are cached keyed by content hash. The table
//! is bounded two ways: a hard capacity with least-recently-used
//! eviction, and a per-entry TTL measured from the last write. Either
//! trigger can fire first.
//!
//! A single mutex covers every operation; critical sections are small
//! map/tree updates and never touch I/O.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CacheConfig;

/// Snapshot of cache accounting, surfaced on the service health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0.0 before the first access.
    pub hit_rate: f64,
}

struct CacheEntry<V> {
    value: V,
    /// Set on put, not refreshed by get; TTL counts from the last write.
    stored_at: Instant,
    seq: u64,
}

enum Lookup<V> {
    Absent,
    Expired,
    Live(V),
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Recency order: lowest sequence is least recently touched.
    recency: BTreeMap<u64, String>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

impl<V> CacheInner<V> {
    fn touch(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.seq);
            entry.seq = self.next_seq;
            self.recency.insert(self.next_seq, key.to_string());
            self.next_seq += 1;
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.seq);
        }
    }
}

/// Thread-safe LRU cache with per-entry TTL.
///
/// Values are cloned out on hit, so `V` is typically a cheap handle or a
/// vector shared behind `Arc`.
pub struct InferenceCache<V> {
    inner: Mutex<CacheInner<V>>,
    max_size: usize,
    ttl: Duration,
}

impl<V: Clone> InferenceCache<V> {
    /// Creates a cache bounded by `max_size` entries and `ttl` per entry.
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
            }),
            max_size,
            ttl,
        }
    }

    /// Creates a cache from the configured bounds.
    #[must_use]
    pub fn from_settings(config: &CacheConfig) -> Self {
        Self::new(config.max_size, Duration::from_secs(config.ttl_seconds))
    }

    /// Retrieves a cached value.
    ///
    /// An entry whose TTL has elapsed since its last write is removed
    /// and counted as a miss. A live hit marks the entry most recently
    /// used without refreshing its TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let lookup = match inner.entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() > self.ttl => Lookup::Expired,
            Some(entry) => Lookup::Live(entry.value.clone()),
            None => Lookup::Absent,
        };

        match lookup {
            Lookup::Absent => {
                inner.misses += 1;
                None
            }
            Lookup::Expired => {
                inner.remove(key);
                inner.misses += 1;
                None
            }
            Lookup::Live(value) => {
                inner.touch(key);
                inner.hits += 1;
                Some(value)
            }
        }
    }

    /// Stores a value, evicting the least-recently-used entry when a new
    /// key would exceed capacity. Existing keys are refreshed in place.
    pub fn put(&self, key: &str, value: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(entry) = inner.entries.get_mut(key) {
            entry.value = value;
            entry.stored_at = Instant::now();
            inner.touch(key);
            return;
        }

        if inner.entries.len() >= self.max_size {
            if let Some((_, evicted_key)) = inner.recency.pop_first() {
                inner.entries.remove(&evicted_key);
                debug!(
                    "Cache evicted: {}",
                    evicted_key.get(..16).unwrap_or(&evicted_key)
                );
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                seq,
            },
        );
        inner.recency.insert(seq, key.to_string());
    }

    /// Returns current accounting.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        let total = guard.hits + guard.misses;
        let hit_rate = if total > 0 {
            ((guard.hits as f64 / total as f64) * 1000.0).round() / 1000.0
        } else {
            0.0
        };

        CacheStats {
            size: guard.entries.len(),
            max_size: self.max_size,
            hits: guard.hits,
            misses: guard.misses,
            hit_rate,
        }
    }

    /// Empties the table and resets hit/miss counters.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.entries.clear();
        guard.recency.clear();
        guard.hits = 0;
        guard.misses = 0;
    }
}

impl<V> std::fmt::Debug for InferenceCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("InferenceCache")
            .field("size", &guard.entries.len())
            .field("max_size", &self.max_size)
            .field("ttl", &self.ttl)
            .finish()
    }
}
