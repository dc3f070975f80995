// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded TTL cache with least-recently-accessed eviction.
//!
//! Eviction picks the entry with the oldest `last_accessed_at` by linear
//! scan. That is fine for the few hundred to a thousand entries the item and
//! search caches hold; a larger deployment would want an intrusive list.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use super::{Cache, CacheEntry, CacheInvalidation, CacheStats, InvalidationScope, StatCounters};
use crate::change::EntityChange;
use crate::clock::SharedClock;

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    seq: u64,
}

impl<K, V> Inner<K, V> {
    fn next_seq(&mut self) -> u64 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }
}

pub struct LruCache<K, V> {
    name: String,
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    ttl: Duration,
    clock: SharedClock,
    scope: InvalidationScope,
    counters: StatCounters,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(name: impl Into<String>, capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                seq: 0,
            }),
            capacity,
            ttl,
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
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.last_accessed_at, e.access_seq))
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                inner.entries.remove(&victim);
                self.counters.evicted(&self.name);
                trace!(cache = %self.name, "Evicted least recently accessed entry");
            }
        }

        inner.entries.insert(key, CacheEntry::new(value, now, ttl, seq));
    }

    pub fn remove(&self, key: &K) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let seq = inner.next_seq();

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.touch(now, seq);
                let value = entry.value.clone();
                drop(inner);
                self.counters.hit(&self.name);
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.entries.remove(key);
            self.counters.expired(1);
        }
        drop(inner);
        self.counters.miss(&self.name);
        None
    }

    fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    fn clear(&self) {
        self.inner.lock().entries.clear();
        self.counters.cleared();
    }

    fn clear_if(&self, predicate: &dyn Fn(&K, &V) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, e| !predicate(k, &e.value));
        before - inner.entries.len()
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn stats(&self) -> CacheStats {
        let len = self.len();
        self.counters.snapshot(len)
    }
}

impl<V> CacheInvalidation for LruCache<String, V>
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
