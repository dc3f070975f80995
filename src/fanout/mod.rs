// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fan-out of confirmed entity changes.
//!
//! # Flow
//!
//! ```text
//! notify(change)
//!       │
//!       ├─ Updated/Deleted → invalidate every registered cache first
//!       │
//!       ├─ prune dead registrations (dropped Arc or is_alive() == false)
//!       │
//!       └─ for each live subscriber accepting the change:
//!              on_change()  ── Err / panic → log, count, continue
//! ```
//!
//! The registry never owns a subscriber: it keeps a `Weak` handle and the
//! subscriber's own context decides its lifetime. Explicit `unregister` is
//! preferred; lazy pruning only bounds growth when a caller forgets.

mod subscriber;

pub use subscriber::{
    ChangeSubscriber, ChannelSubscriber, FnSubscriber, SubscriberCapabilities, SubscriberError,
    SubscriberId, SubscriptionToken,
};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::CacheInvalidation;
use crate::change::EntityChange;

struct Registration {
    token: SubscriptionToken,
    handle: Weak<dyn ChangeSubscriber>,
    capabilities: SubscriberCapabilities,
}

/// Per-notify delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
    /// Filtered out by capabilities
    pub skipped: usize,
    pub pruned: usize,
    pub caches_invalidated: usize,
}

impl NotifyReport {
    fn merge(&mut self, other: NotifyReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.pruned += other.pruned;
        self.caches_invalidated += other.caches_invalidated;
    }
}

#[derive(Default)]
pub struct UpdatePropagator {
    subscribers: RwLock<Vec<Registration>>,
    caches: RwLock<Vec<Arc<dyn CacheInvalidation>>>,
}

impl UpdatePropagator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Re-registering the same [`SubscriberId`]
    /// refreshes the handle and returns the original token.
    pub fn register<S>(&self, subscriber: &Arc<S>, capabilities: SubscriberCapabilities) -> SubscriptionToken
    where
        S: ChangeSubscriber + 'static,
    {
        let id = subscriber.subscriber_id();
        let handle: Weak<dyn ChangeSubscriber> = Arc::downgrade(subscriber) as Weak<dyn ChangeSubscriber>;
        let mut subs = self.subscribers.write();

        if let Some(existing) = subs.iter_mut().find(|r| r.token.subscriber_id == id) {
            existing.handle = handle;
            existing.capabilities = capabilities;
            debug!(subscriber = %id, "Subscriber re-registered");
            return existing.token.clone();
        }

        let token = SubscriptionToken::new(id.clone());
        subs.push(Registration {
            token: token.clone(),
            handle,
            capabilities,
        });
        info!(subscriber = %id, total = subs.len(), "Subscriber registered");
        token
    }

    /// Remove a registration; returns whether it existed.
    pub fn unregister(&self, token: &SubscriptionToken) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|r| r.token.id != token.id);
        let removed = subs.len() != before;
        if removed {
            debug!(subscriber = %token.subscriber_id, "Subscriber unregistered");
        }
        removed
    }

    /// Register a cache that derives data from catalog entities.
    pub fn register_cache(&self, cache: Arc<dyn CacheInvalidation>) {
        let mut caches = self.caches.write();
        if caches.iter().any(|c| Arc::ptr_eq(c, &cache)) {
            return;
        }
        debug!(cache = cache.name(), "Cache registered for invalidation");
        caches.push(cache);
    }

    /// Registered subscriber count, dead or alive.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    #[must_use]
    pub fn cache_count(&self) -> usize {
        self.caches.read().len()
    }

    /// Deliver one change to every interested live subscriber.
    pub fn notify(&self, change: &EntityChange) -> NotifyReport {
        let mut report = NotifyReport::default();

        if change.kind.invalidates_caches() {
            report.caches_invalidated = self.invalidate_caches(change);
        }

        let (live, pruned) = self.live_subscribers();
        report.pruned = pruned;

        for (subscriber, capabilities) in live {
            if !capabilities.accepts(change) {
                report.skipped += 1;
                continue;
            }
            let id = subscriber.subscriber_id();
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_change(change))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(subscriber = %id, change = %change, error = %e, "Subscriber failed to handle change");
                    crate::metrics::record_subscriber_failure(id.as_str(), "error");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(subscriber = %id, change = %change, "Subscriber panicked while handling change");
                    crate::metrics::record_subscriber_failure(id.as_str(), "panic");
                }
            }
        }

        crate::metrics::record_fanout(report.delivered, report.failed);
        report
    }

    /// Deliver a batch of changes in order.
    pub fn notify_all(&self, changes: &[EntityChange]) -> NotifyReport {
        let mut total = NotifyReport::default();
        for change in changes {
            total.merge(self.notify(change));
        }
        total
    }

    /// Clear every registered cache regardless of entity (after a full sync).
    pub fn invalidate_all_caches(&self) -> usize {
        let caches: Vec<_> = self.caches.read().clone();
        let mut cleared = 0;
        for cache in caches {
            match catch_unwind(AssertUnwindSafe(|| cache.clear_all())) {
                Ok(()) => cleared += 1,
                Err(_) => error!(cache = cache.name(), "Cache clear panicked"),
            }
        }
        cleared
    }

    fn invalidate_caches(&self, change: &EntityChange) -> usize {
        let caches: Vec<_> = self.caches.read().clone();
        let mut invalidated = 0;
        for cache in caches {
            match catch_unwind(AssertUnwindSafe(|| cache.invalidate(change))) {
                Ok(()) => invalidated += 1,
                Err(_) => error!(cache = cache.name(), change = %change, "Cache invalidation panicked"),
            }
        }
        invalidated
    }

    /// Upgrade live handles and drop the dead ones. Handlers run outside the lock.
    #[allow(clippy::type_complexity)]
    fn live_subscribers(&self) -> (Vec<(Arc<dyn ChangeSubscriber>, SubscriberCapabilities)>, usize) {
        let mut subs = self.subscribers.write();
        let mut live = Vec::with_capacity(subs.len());
        let before = subs.len();

        subs.retain(|r| match r.handle.upgrade() {
            Some(s) if s.is_alive() => {
                live.push((s, r.capabilities.clone()));
                true
            }
            _ => {
                debug!(subscriber = %r.token.subscriber_id, "Pruning dead subscriber");
                false
            }
        });

        let pruned = before - subs.len();
        (live, pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, TtlCache};
    use crate::change::{ChangeKind, EntityType};
    use crate::clock::ManualClock;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorder {
        id: &'static str,
        seen: Mutex<Vec<EntityChange>>,
        fail: bool,
    }

    impl Recorder {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self { id, seen: Mutex::new(Vec::new()), fail: false })
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Arc::new(Self { id, seen: Mutex::new(Vec::new()), fail: true })
        }

        fn count(&self) -> usize {
            self.seen.lock().len()
        }
    }

    impl ChangeSubscriber for Recorder {
        fn subscriber_id(&self) -> SubscriberId {
            SubscriberId::from(self.id)
        }

        fn on_change(&self, change: &EntityChange) -> Result<(), SubscriberError> {
            self.seen.lock().push(change.clone());
            if self.fail {
                return Err(SubscriberError::Failed("boom".into()));
            }
            Ok(())
        }
    }

    struct Panicker;

    impl ChangeSubscriber for Panicker {
        fn subscriber_id(&self) -> SubscriberId {
            SubscriberId::from("panicker")
        }

        fn on_change(&self, _change: &EntityChange) -> Result<(), SubscriberError> {
            panic!("handler blew up");
        }
    }

    fn item_update() -> EntityChange {
        EntityChange::updated(EntityType::Item, "item-1")
    }

    #[test]
    fn test_failure_does_not_block_others() {
        let propagator = UpdatePropagator::new();
        let a = Recorder::new("a");
        let b = Recorder::failing("b");
        let c = Recorder::new("c");
        propagator.register(&a, SubscriberCapabilities::all());
        propagator.register(&b, SubscriberCapabilities::all());
        propagator.register(&c, SubscriberCapabilities::all());

        let report = propagator.notify(&item_update());

        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(c.count(), 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_panic_does_not_block_others() {
        let propagator = UpdatePropagator::new();
        let a = Recorder::new("a");
        let p = Arc::new(Panicker);
        let c = Recorder::new("c");
        propagator.register(&a, SubscriberCapabilities::all());
        propagator.register(&p, SubscriberCapabilities::all());
        propagator.register(&c, SubscriberCapabilities::all());

        let report = propagator.notify(&item_update());

        assert_eq!(a.count(), 1);
        assert_eq!(c.count(), 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_duplicate_registration_delivers_once() {
        let propagator = UpdatePropagator::new();
        let a = Recorder::new("a");
        let t1 = propagator.register(&a, SubscriberCapabilities::all());
        let t2 = propagator.register(&a, SubscriberCapabilities::all());

        assert_eq!(t1, t2);
        assert_eq!(propagator.subscriber_count(), 1);
        propagator.notify(&item_update());
        assert_eq!(a.count(), 1);
    }

    #[test]
    fn test_dropped_subscriber_pruned_lazily() {
        let propagator = UpdatePropagator::new();
        let a = Recorder::new("a");
        let gone = Recorder::new("gone");
        propagator.register(&a, SubscriberCapabilities::all());
        propagator.register(&gone, SubscriberCapabilities::all());
        drop(gone);

        assert_eq!(propagator.subscriber_count(), 2);
        let report = propagator.notify(&item_update());
        assert_eq!(report.pruned, 1);
        assert_eq!(propagator.subscriber_count(), 1);
        assert_eq!(a.count(), 1);
    }

    #[test]
    fn test_closed_channel_pruned() {
        let propagator = UpdatePropagator::new();
        let (sub, rx) = ChannelSubscriber::new("detail-view");
        let sub = Arc::new(sub);
        propagator.register(&sub, SubscriberCapabilities::all());
        drop(rx);

        let report = propagator.notify(&item_update());
        assert_eq!(report.pruned, 1);
        assert_eq!(report.delivered, 0);
    }

    #[test]
    fn test_unregister() {
        let propagator = UpdatePropagator::new();
        let a = Recorder::new("a");
        let token = propagator.register(&a, SubscriberCapabilities::all());
        assert!(propagator.unregister(&token));
        assert!(!propagator.unregister(&token));
        propagator.notify(&item_update());
        assert_eq!(a.count(), 0);
    }

    #[test]
    fn test_capabilities_skip() {
        let propagator = UpdatePropagator::new();
        let images = Recorder::new("images");
        propagator.register(&images, SubscriberCapabilities::all().entity_types([EntityType::Image]));

        let report = propagator.notify(&item_update());
        assert_eq!(report.skipped, 1);
        assert_eq!(images.count(), 0);
    }

    #[test]
    fn test_caches_cleared_before_subscribers_run() {
        let clock = ManualClock::default();
        let cache: Arc<TtlCache<String, u32>> =
            Arc::new(TtlCache::new("search", Duration::from_secs(60), Arc::new(clock)));
        cache.set("item-1".into(), 1);

        let propagator = UpdatePropagator::new();
        propagator.register_cache(cache.clone());

        let observed = Arc::new(AtomicUsize::new(usize::MAX));
        let probe_cache = cache.clone();
        let probe_seen = observed.clone();
        let probe = Arc::new(FnSubscriber::new("probe", move |_c: &EntityChange| {
            probe_seen.store(probe_cache.len(), Ordering::SeqCst);
            Ok(())
        }));
        propagator.register(&probe, SubscriberCapabilities::all());

        let report = propagator.notify(&item_update());
        assert_eq!(report.caches_invalidated, 1);
        assert_eq!(observed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_created_does_not_invalidate() {
        let clock = ManualClock::default();
        let cache: Arc<TtlCache<String, u32>> =
            Arc::new(TtlCache::new("search", Duration::from_secs(60), Arc::new(clock)));
        cache.set("item-1".into(), 1);
        let propagator = UpdatePropagator::new();
        propagator.register_cache(cache.clone());

        let report = propagator.notify(&EntityChange::new(ChangeKind::Created, EntityType::Item, "item-2"));
        assert_eq!(report.caches_invalidated, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_notify_all_sums_reports() {
        let clock = ManualClock::default();
        let cache: Arc<TtlCache<String, u32>> =
            Arc::new(TtlCache::new("search", Duration::from_secs(60), Arc::new(clock)));
        let propagator = UpdatePropagator::new();
        propagator.register_cache(cache.clone());
        assert_eq!(propagator.cache_count(), 1);

        let items = Recorder::new("items");
        propagator.register(&items, SubscriberCapabilities::all().entity_types([EntityType::Item]));

        let report = propagator.notify_all(&[
            item_update(),
            EntityChange::updated(EntityType::Price, "price-1"),
            EntityChange::deleted(EntityType::Item, "item-2"),
        ]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.caches_invalidated, 3);
        assert_eq!(items.count(), 2);
    }
}
