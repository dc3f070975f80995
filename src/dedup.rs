// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Webhook event deduplication.
//!
//! Webhook delivery is at-least-once, so the same event id can arrive many
//! times. The deduplicator remembers ids that were acted on (sync started or
//! suppressed as an echo) and answers membership queries.
//!
//! Memory is bounded two ways:
//! - **Hard bound** (`max_entries`), checked on every insert. In
//!   [`DedupEviction::BulkClear`] mode the whole set is dropped; in
//!   [`DedupEviction::Expiring`] mode the oldest ids go first.
//! - **Retention sweep** (expiring mode), run at most once per cleanup
//!   interval, drops ids older than the retention period.
//!
//! Forgetting an id means a very late redelivery of it would be processed
//! again. That is the deliberate trade-off for bounded memory.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{elapsed_between, SharedClock};
use crate::config::{CatalogSyncConfig, DedupEviction};

/// Record of an event id that was acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProcessedEventRecord {
    event_id: String,
    processed_at: DateTime<Utc>,
}

/// Snapshot of deduplicator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupStats {
    pub tracked: usize,
    /// Ids forgotten through bound enforcement or retention sweeps
    pub forgotten: u64,
    pub cleanups: u64,
}

pub struct EventDeduplicator {
    ids: HashSet<String>,
    /// Insertion order, oldest first
    order: VecDeque<ProcessedEventRecord>,
    max_entries: usize,
    cleanup_interval: Duration,
    retention: Duration,
    eviction: DedupEviction,
    last_cleanup: DateTime<Utc>,
    forgotten: u64,
    cleanups: u64,
    clock: SharedClock,
}

impl EventDeduplicator {
    pub fn new(
        max_entries: usize,
        cleanup_interval: Duration,
        retention: Duration,
        eviction: DedupEviction,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now();
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            max_entries: max_entries.max(1),
            cleanup_interval,
            retention,
            eviction,
            last_cleanup: now,
            forgotten: 0,
            cleanups: 0,
            clock,
        }
    }

    pub fn from_config(config: &CatalogSyncConfig, clock: SharedClock) -> Self {
        Self::new(
            config.dedup_max_entries,
            config.dedup_cleanup_interval(),
            config.dedup_retention(),
            config.dedup_eviction,
            clock,
        )
    }

    /// Whether `event_id` was already acted on.
    pub fn is_duplicate(&mut self, event_id: &str) -> bool {
        self.maybe_cleanup();
        self.ids.contains(event_id)
    }

    /// Remember `event_id`. Idempotent.
    pub fn mark_processed(&mut self, event_id: &str) {
        if self.ids.contains(event_id) {
            return;
        }
        let now = self.clock.now();
        self.make_room();
        self.ids.insert(event_id.to_string());
        self.order.push_back(ProcessedEventRecord {
            event_id: event_id.to_string(),
            processed_at: now,
        });
        self.maybe_cleanup();
        crate::metrics::set_dedup_entries(self.ids.len());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            tracked: self.ids.len(),
            forgotten: self.forgotten,
            cleanups: self.cleanups,
        }
    }

    /// Free a slot for one more id. The id being marked is never the one dropped.
    fn make_room(&mut self) {
        if self.ids.len() < self.max_entries {
            return;
        }
        match self.eviction {
            DedupEviction::BulkClear => {
                let dropped = self.ids.len();
                self.ids.clear();
                self.order.clear();
                self.forgotten += dropped as u64;
                debug!(dropped, "Dedup set at bound, cleared");
            }
            DedupEviction::Expiring => {
                while self.ids.len() >= self.max_entries {
                    let Some(oldest) = self.order.pop_front() else { break };
                    self.ids.remove(&oldest.event_id);
                    self.forgotten += 1;
                }
            }
        }
    }

    /// Retention sweep, gated by the cleanup interval.
    fn maybe_cleanup(&mut self) {
        let now = self.clock.now();
        if elapsed_between(self.last_cleanup, now) < self.cleanup_interval {
            return;
        }
        self.last_cleanup = now;
        self.cleanups += 1;

        if self.eviction != DedupEviction::Expiring {
            return;
        }
        let mut dropped = 0usize;
        while let Some(front) = self.order.front() {
            if elapsed_between(front.processed_at, now) <= self.retention {
                break;
            }
            if let Some(expired) = self.order.pop_front() {
                self.ids.remove(&expired.event_id);
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.forgotten += dropped as u64;
            debug!(dropped, remaining = self.ids.len(), "Dedup retention sweep");
            crate::metrics::set_dedup_entries(self.ids.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn dedup(max: usize, eviction: DedupEviction) -> (EventDeduplicator, ManualClock) {
        let clock = ManualClock::default();
        let d = EventDeduplicator::new(
            max,
            Duration::from_secs(3600),
            Duration::from_secs(7200),
            eviction,
            Arc::new(clock.clone()),
        );
        (d, clock)
    }

    #[test]
    fn test_marks_and_detects() {
        let (mut d, _clock) = dedup(10, DedupEviction::Expiring);
        assert!(!d.is_duplicate("evt-1"));
        d.mark_processed("evt-1");
        assert!(d.is_duplicate("evt-1"));
        assert!(!d.is_duplicate("evt-2"));
    }

    #[test]
    fn test_mark_is_idempotent() {
        let (mut d, _clock) = dedup(10, DedupEviction::Expiring);
        d.mark_processed("evt-1");
        d.mark_processed("evt-1");
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_bulk_clear_over_bound() {
        let (mut d, _clock) = dedup(3, DedupEviction::BulkClear);
        for i in 0..3 {
            d.mark_processed(&format!("evt-{i}"));
        }
        assert_eq!(d.len(), 3);
        d.mark_processed("evt-3");
        assert_eq!(d.len(), 1);
        assert_eq!(d.stats().forgotten, 3);
        assert!(!d.is_duplicate("evt-0"));
    }

    #[test]
    fn test_bulk_clear_keeps_id_that_crossed_bound() {
        let (mut d, _clock) = dedup(3, DedupEviction::BulkClear);
        for i in 0..4 {
            d.mark_processed(&format!("evt-{i}"));
        }
        assert!(d.is_duplicate("evt-3"));
    }

    #[test]
    fn test_expiring_drops_oldest_over_bound() {
        let (mut d, _clock) = dedup(3, DedupEviction::Expiring);
        for i in 0..4 {
            d.mark_processed(&format!("evt-{i}"));
        }
        assert_eq!(d.len(), 3);
        assert!(!d.is_duplicate("evt-0"));
        assert!(d.is_duplicate("evt-1"));
        assert!(d.is_duplicate("evt-3"));
    }

    #[test]
    fn test_retention_sweep_respects_interval() {
        let (mut d, clock) = dedup(100, DedupEviction::Expiring);
        d.mark_processed("old");
        clock.advance(Duration::from_secs(3 * 3600));
        d.mark_processed("new");
        // Sweep ran on the mark above: "old" is past the 2h retention.
        assert!(!d.is_duplicate("old"));
        assert!(d.is_duplicate("new"));
        assert_eq!(d.stats().cleanups, 1);

        // Within the interval no further sweep happens.
        clock.advance(Duration::from_secs(60));
        d.is_duplicate("new");
        assert_eq!(d.stats().cleanups, 1);
    }

    #[test]
    fn test_bulk_mode_has_no_retention() {
        let (mut d, clock) = dedup(100, DedupEviction::BulkClear);
        d.mark_processed("evt");
        clock.advance(Duration::from_secs(10 * 3600));
        assert!(d.is_duplicate("evt"));
    }
}
