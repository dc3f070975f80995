// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory TTL cache layer read by catalog subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Cache Module                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ttl.rs  - TtlCache: unbounded, lazy per-entry expiry plus   │
//! │            whole-cache age check (bulk lookup caches)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  lru.rs  - LruCache: bounded, per-entry expiry, evicts the   │
//! │            least recently *accessed* entry on overflow       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expiry is evaluated lazily on reads; there is no background sweep.
//! The primary invalidation path is explicit: the fan-out propagator calls
//! [`CacheInvalidation::invalidate`] when the source of truth changes.

pub mod lru;
pub mod ttl;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::change::EntityChange;
use crate::clock::elapsed_between;

pub use lru::LruCache;
pub use ttl::TtlCache;

/// Common cache contract.
pub trait Cache<K, V>: Send + Sync {
    /// Fresh value for `key`, or `None` (missing or expired).
    fn get(&self, key: &K) -> Option<V>;
    /// Insert using the cache's default TTL.
    fn set(&self, key: K, value: V);
    /// Drop every entry.
    fn clear(&self);
    /// Drop entries matching `predicate`; returns how many were removed.
    fn clear_if(&self, predicate: &dyn Fn(&K, &V) -> bool) -> usize;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn stats(&self) -> CacheStats;
}

/// Hook used by the propagator to drop derived data about a changed entity.
pub trait CacheInvalidation: Send + Sync {
    /// Name for logs and metrics.
    fn name(&self) -> &str;
    fn invalidate(&self, change: &EntityChange);
    /// Drop everything this cache holds.
    fn clear_all(&self);
}

/// Cached value with bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub ttl: Duration,
    /// Monotonic access sequence; breaks ties between equal access timestamps.
    pub(crate) access_seq: u64,
}

impl<V> CacheEntry<V> {
    pub(crate) fn new(value: V, now: DateTime<Utc>, ttl: Duration, seq: u64) -> Self {
        Self {
            value,
            inserted_at: now,
            last_accessed_at: now,
            ttl,
            access_seq: seq,
        }
    }

    /// Expired once its age strictly exceeds the TTL.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        elapsed_between(self.inserted_at, now) > self.ttl
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>, seq: u64) {
        self.last_accessed_at = now;
        self.access_seq = seq;
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because their TTL elapsed
    pub expired: u64,
    /// Entries dropped to make room (LRU only)
    pub evictions: u64,
    /// Whole-cache clears (explicit or age-triggered)
    pub clears: u64,
    pub entry_count: usize,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Shared atomic counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
    clears: AtomicU64,
}

impl StatCounters {
    pub(crate) fn hit(&self, cache: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup(cache, "hit");
    }

    pub(crate) fn miss(&self, cache: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_lookup(cache, "miss");
    }

    pub(crate) fn expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, cache: &str) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_cache_eviction(cache);
    }

    pub(crate) fn cleared(&self) {
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: usize) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            entry_count,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// How a cache reacts to an entity change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Drop everything (derived/aggregate data such as search results).
    All,
    /// Drop only the entry keyed by the changed entity id.
    Entity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_entry_expiry_is_strict() {
        let t0 = Utc.timestamp_opt(1000, 0).unwrap();
        let entry = CacheEntry::new(1u8, t0, Duration::from_secs(10), 0);
        assert!(!entry.is_expired(t0 + chrono::Duration::seconds(10)));
        assert!(entry.is_expired(t0 + chrono::Duration::seconds(11)));
    }

    #[test]
    fn test_stats_hit_rate() {
        let counters = StatCounters::default();
        counters.hit("t");
        counters.hit("t");
        counters.hit("t");
        counters.miss("t");
        let stats = counters.snapshot(2);
        assert_eq!(stats.entry_count, 2);
        assert!((stats.hit_rate - 0.75).abs() < 0.01);
    }
}
