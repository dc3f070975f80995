// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for catalog-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `catalog_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `source`: webhook, app_launch, manual, periodic
//! - `disposition`: started, duplicate, echo_suppressed, sync_in_progress, ...
//! - `kind`: incremental, full
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a trigger and what the coordinator did with it
pub fn record_trigger(source: &str, disposition: &str) {
    counter!(
        "catalog_sync_triggers_total",
        "source" => source.to_string(),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// Record a sync attempt against the external engine
pub fn record_sync_attempt(kind: &str) {
    counter!(
        "catalog_sync_sync_attempts_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record how a sync attempt ended
pub fn record_sync_outcome(kind: &str, status: &str) {
    counter!(
        "catalog_sync_sync_outcomes_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record sync latency
pub fn record_sync_latency(kind: &str, duration: Duration) {
    histogram!(
        "catalog_sync_sync_seconds",
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record items processed by a completed sync
pub fn record_items_processed(kind: &str, count: u64) {
    counter!(
        "catalog_sync_items_processed_total",
        "kind" => kind.to_string()
    )
    .increment(count);
}

/// Record the incremental → full escalation
pub fn record_full_sync_fallback() {
    counter!("catalog_sync_full_sync_fallbacks_total").increment(1);
}

/// Set orchestrator state (0 = Idle, 1 = SyncingIncremental, 2 = SyncingFull)
pub fn set_sync_state(state: u8) {
    gauge!("catalog_sync_state").set(state as f64);
}

/// Set whether triggers are blocked on re-authentication
pub fn set_auth_blocked(blocked: bool) {
    gauge!("catalog_sync_auth_blocked").set(if blocked { 1.0 } else { 0.0 });
}

/// Set tracked webhook event ids
pub fn set_dedup_entries(count: usize) {
    gauge!("catalog_sync_dedup_entries").set(count as f64);
}

/// Record a cache lookup result
pub fn record_cache_lookup(cache: &str, result: &str) {
    counter!(
        "catalog_sync_cache_lookups_total",
        "cache" => cache.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record a capacity eviction
pub fn record_cache_eviction(cache: &str) {
    counter!(
        "catalog_sync_cache_evictions_total",
        "cache" => cache.to_string()
    )
    .increment(1);
}

/// Record fan-out deliveries
pub fn record_fanout(delivered: usize, failed: usize) {
    counter!("catalog_sync_fanout_deliveries_total").increment(delivered as u64);
    if failed > 0 {
        counter!("catalog_sync_fanout_failures_total").increment(failed as u64);
    }
}

/// Record a subscriber failing to handle a change
pub fn record_subscriber_failure(subscriber: &str, reason: &str) {
    counter!(
        "catalog_sync_subscriber_failures_total",
        "subscriber" => subscriber.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a push-token registration attempt
pub fn record_push_registration(status: &str) {
    counter!(
        "catalog_sync_push_registrations_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// A timer that records sync latency on drop
pub struct LatencyTimer {
    kind: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_sync_latency(self.kind, self.start.elapsed());
    }
}
