//! The process-wide fallback response cache.
//!
//! Bounded by entry count with oldest-by-insertion eviction. Entries carry
//! their own TTL; expiry is checked lazily on every read, and a periodic
//! sweep (driven by the health monitor) removes entries nothing is reading.

use aegis_core::Clock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at: Duration,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Duration) -> bool {
        now.saturating_sub(self.inserted_at) >= self.ttl
    }
}

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
    /// Live entries (including not-yet-swept expired ones).
    pub entries: usize,
    /// Reads that returned a fresh value.
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// Entries deleted because their TTL elapsed.
    pub expirations: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<(String, String), CacheEntry>,
    insertion_order: VecDeque<(String, String)>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Bounded TTL cache for fallback payloads, keyed by (target, key).
pub struct ResponseCache {
    clock: Arc<dyn Clock>,
    max_entries: usize,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    /// Creates a cache bounded to `max_entries`.
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            clock,
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Inserts or replaces an entry. When the cache is at its bound, the
    /// oldest-by-insertion entry is evicted first.
    pub fn put(&self, target: &str, key: &str, value: Value, ttl: Duration) {
        let now = self.clock.now();
        let cache_key = (target.to_string(), key.to_string());
        let mut inner = self.inner.lock().unwrap();

        if inner.entries.contains_key(&cache_key) {
            inner.insertion_order.retain(|k| k != &cache_key);
        } else if inner.entries.len() >= self.max_entries {
            if let Some(oldest) = inner.insertion_order.pop_front() {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
            }
        }

        inner.entries.insert(
            cache_key.clone(),
            CacheEntry {
                value,
                inserted_at: now,
                ttl,
            },
        );
        inner.insertion_order.push_back(cache_key);
    }

    /// Reads a fresh value. An expired entry is deleted at the point of
    /// read and counts as a miss.
    pub fn get(&self, target: &str, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let cache_key = (target.to_string(), key.to_string());
        let mut inner = self.inner.lock().unwrap();

        match inner.entries.get(&cache_key) {
            Some(entry) if entry.is_expired(now) => {
                inner.entries.remove(&cache_key);
                inner.insertion_order.retain(|k| k != &cache_key);
                inner.expirations += 1;
                inner.misses += 1;
                None
            }
            Some(entry) => {
                let value = entry.value.clone();
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// True when a fresh entry exists. Does not move the hit/miss counters.
    pub fn contains_fresh(&self, target: &str, key: &str) -> bool {
        let now = self.clock.now();
        let cache_key = (target.to_string(), key.to_string());
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&cache_key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Removes one entry.
    pub fn invalidate(&self, target: &str, key: &str) -> bool {
        let cache_key = (target.to_string(), key.to_string());
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.entries.remove(&cache_key).is_some();
        if removed {
            inner.insertion_order.retain(|k| k != &cache_key);
        }
        removed
    }

    /// Deletes every expired entry; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock().unwrap();

        let expired: Vec<(String, String)> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.entries.remove(key);
            inner.insertion_order.retain(|k| k != key);
            inner.expirations += 1;
        }
        expired.len()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// True when the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Effectiveness counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}
