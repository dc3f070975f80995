// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Unbounded TTL cache with coarse whole-cache expiry.
//!
//! Two expiry checks run on every access:
//!
//! 1. **Cache age**: if the cache as a whole is older than its TTL (measured
//!    from the last full clear), everything is dropped at once. This is the
//!    cheap policy used for bulk lookup tables (e.g. category names).
//! 2. **Entry age**: a hit whose own TTL has elapsed is removed and reported
//!    as a miss.

use std::hash::Hash;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{Cache, CacheEntry, CacheInvalidation, CacheStats, InvalidationScope, StatCounters};
use crate::change::EntityChange;
use crate::clock::{elapsed_between, SharedClock};

pub struct TtlCache<K, V> {
    name: String,
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    /// Start of the current cache generation
    generation_started: Mutex<DateTime<Utc>>,
    access_seq: AtomicU64,
    clock: SharedClock,
    scope: InvalidationScope,
    counters: StatCounters,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(name: impl Into<String>, ttl: Duration, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            entries: DashMap::new(),
            ttl,
            generation_started: Mutex::new(now),
            access_seq: AtomicU64::new(0),
            clock,
            scope: InvalidationScope::All,
            counters: StatCounters::default(),
        }
    }

    /// Set how entity changes invalidate this cache (default: drop everything).
    #[must_use]
    pub fn with_scope(mut self, scope: InvalidationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert with a TTL other than the cache default.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = self.clock.now();
        self.expire_generation(now);
        let seq = self.next_seq();
        self.entries.insert(key, CacheEntry::new(value, now, ttl, seq));
    }

    /// Remove one key; returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Whole-cache age check. Returns true if the cache was cleared.
    fn expire_generation(&self, now: DateTime<Utc>) -> bool {
        let mut started = self.generation_started.lock();
        if elapsed_between(*started, now) <= self.ttl {
            return false;
        }
        let dropped = self.entries.len();
        self.entries.clear();
        *started = now;
        self.counters.cleared();
        self.counters.expired(dropped as u64);
        if dropped > 0 {
            debug!(cache = %self.name, dropped, "Cache generation expired, cleared");
        }
        true
    }
}

impl<K, V> Cache<K, V> for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.expire_generation(now);

        let stale = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                let seq = self.next_seq();
                entry.touch(now, seq);
                self.counters.hit(&self.name);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if stale && self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some() {
            self.counters.expired(1);
        }
        self.counters.miss(&self.name);
        None
    }

    fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    fn clear(&self) {
        self.entries.clear();
        *self.generation_started.lock() = self.clock.now();
        self.counters.cleared();
    }

    fn clear_if(&self, predicate: &dyn Fn(&K, &V) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, e| !predicate(k, &e.value));
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }
}

impl<V> CacheInvalidation for TtlCache<String, V>
where
    V: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, change: &EntityChange) {
        match self.scope {
            InvalidationScope::All => self.clear(),
            InvalidationScope::Entity => {
                self.remove(&change.entity_id);
            }
        }
    }

    fn clear_all(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache(ttl_secs: u64) -> (TtlCache<String, u32>, ManualClock) {
        let clock = ManualClock::default();
        let cache = TtlCache::new("test", Duration::from_secs(ttl_secs), Arc::new(clock.clone()));
        (cache, clock)
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = cache(60);
        cache.set("k".into(), 1);
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get(&"k".to_string()), Some(1));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expired_after_ttl_and_removed() {
        let (cache, clock) = cache(60);
        cache.set("k".into(), 1);
        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get(&"k".to_string()), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_entry_ttl_shorter_than_cache_ttl() {
        let (cache, clock) = cache(3600);
        cache.set_with_ttl("short".into(), 1, Duration::from_secs(5));
        cache.set("long".into(), 2);
        clock.advance(Duration::from_secs(6));

        assert_eq!(cache.get(&"short".to_string()), None);
        assert_eq!(cache.get(&"long".to_string()), Some(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn test_generation_expiry_clears_everything() {
        let (cache, clock) = cache(10);
        cache.set("a".into(), 1);
        clock.advance(Duration::from_secs(8));
        // Fresh entry, but the cache generation is older than the TTL.
        cache.set("b".into(), 2);
        clock.advance(Duration::from_secs(3));

        assert_eq!(cache.get(&"b".to_string()), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().clears, 1);
    }

    #[test]
    fn test_clear_if() {
        let (cache, _clock) = cache(60);
        cache.set("item:1".into(), 1);
        cache.set("item:2".into(), 2);
        cache.set("cat:1".into(), 3);

        let removed = cache.clear_if(&|k: &String, _v: &u32| k.starts_with("item:"));
        assert_eq!(removed, 2);
        assert_eq!(cache.get(&"cat:1".to_string()), Some(3));
    }

    #[test]
    fn test_entity_scoped_invalidation() {
        let (cache, _clock) = cache(60);
        let cache = cache.with_scope(InvalidationScope::Entity);
        cache.set("item-1".into(), 1);
        cache.set("item-2".into(), 2);

        cache.invalidate(&EntityChange::updated(crate::change::EntityType::Item, "item-1"));
        assert_eq!(cache.get(&"item-1".to_string()), None);
        assert_eq!(cache.get(&"item-2".to_string()), Some(2));
    }

    #[test]
    fn test_full_invalidation_restarts_generation() {
        let (cache, clock) = cache(10);
        clock.advance(Duration::from_secs(8));
        cache.invalidate(&EntityChange::deleted(crate::change::EntityType::Item, "x"));
        cache.set("k".into(), 1);
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get(&"k".to_string()), Some(1));
    }
}
