// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local write echo suppression.
//!
//! After this client writes an entity, the remote system sends a change
//! notification for that very write. Re-syncing on it is pure churn, so
//! incoming notifications whose timestamp lands within `window` of any
//! recent local write are treated as echoes.
//!
//! The webhook payload does not name the changed entity, so the match is
//! on timestamp proximity across *all* recent local writes. Concurrent
//! edits of different entities inside one window can therefore mask a
//! genuinely external change until the next trigger.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::clock::{distance, elapsed_between, SharedClock};

/// Retained records live for this many windows.
const RETENTION_WINDOWS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalWriteRecord {
    pub entity_id: String,
    pub written_at: DateTime<Utc>,
}

pub struct EchoSuppressor {
    writes: Vec<LocalWriteRecord>,
    window: Duration,
    last_prune: DateTime<Utc>,
    clock: SharedClock,
}

impl EchoSuppressor {
    pub fn new(window: Duration, clock: SharedClock) -> Self {
        let now = clock.now();
        Self {
            writes: Vec::new(),
            window,
            last_prune: now,
            clock,
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remember a successful local mutation of `entity_id` at `at`.
    pub fn record_local_write(&mut self, entity_id: impl Into<String>, at: DateTime<Utc>) {
        let entity_id = entity_id.into();
        trace!(entity_id = %entity_id, at = %at, "Recorded local write");
        self.writes.push(LocalWriteRecord {
            entity_id,
            written_at: at,
        });
        self.prune(self.clock.now());
    }

    /// Whether a remote change stamped `remote_timestamp` is an echo of a
    /// retained local write. The window is inclusive on both sides.
    pub fn is_echo(&mut self, remote_timestamp: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        if elapsed_between(self.last_prune, now) >= self.window {
            self.prune(now);
        }

        let matched = self
            .writes
            .iter()
            .find(|w| distance(w.written_at, remote_timestamp) <= self.window);

        if let Some(write) = matched {
            debug!(
                entity_id = %write.entity_id,
                local = %write.written_at,
                remote = %remote_timestamp,
                "Remote change matches local write"
            );
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn retained(&self) -> usize {
        self.writes.len()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let max_age = self.window * RETENTION_WINDOWS;
        self.writes
            .retain(|w| elapsed_between(w.written_at, now) <= max_age);
        self.last_prune = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::Arc;

    fn secs(clock: &ManualClock, offset: i64) -> DateTime<Utc> {
        clock.now() + chrono::Duration::seconds(offset)
    }

    fn suppressor() -> (EchoSuppressor, ManualClock) {
        let clock = ManualClock::default();
        (EchoSuppressor::new(Duration::from_secs(5), Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_within_window_is_echo() {
        let (mut echo, clock) = suppressor();
        let t0 = clock.now();
        echo.record_local_write("item-42", t0);
        clock.advance(Duration::from_secs(3));
        assert!(echo.is_echo(t0 + chrono::Duration::seconds(2)));
    }

    #[test]
    fn test_window_boundary_inclusive() {
        let (mut echo, clock) = suppressor();
        let t0 = clock.now();
        echo.record_local_write("item-1", t0);
        assert!(echo.is_echo(secs(&clock, 5)));
        assert!(echo.is_echo(secs(&clock, -5)));
        assert!(!echo.is_echo(secs(&clock, 6)));
    }

    #[test]
    fn test_outside_window_not_echo() {
        let (mut echo, clock) = suppressor();
        let t0 = clock.now();
        echo.record_local_write("item-42", t0);
        clock.advance(Duration::from_secs(7));
        assert!(!echo.is_echo(t0 + chrono::Duration::seconds(6)));
    }

    #[test]
    fn test_matches_any_entity() {
        let (mut echo, clock) = suppressor();
        echo.record_local_write("item-1", clock.now());
        // The remote notification carries no entity id.
        assert!(echo.is_echo(secs(&clock, 1)));
    }

    #[test]
    fn test_old_records_pruned_on_record() {
        let (mut echo, clock) = suppressor();
        echo.record_local_write("item-1", clock.now());
        clock.advance(Duration::from_secs(16));
        echo.record_local_write("item-2", clock.now());
        assert_eq!(echo.retained(), 1);
    }

    #[test]
    fn test_old_records_pruned_on_check() {
        let (mut echo, clock) = suppressor();
        let t0 = clock.now();
        echo.record_local_write("item-1", t0);
        clock.advance(Duration::from_secs(20));
        assert!(!echo.is_echo(t0));
        assert_eq!(echo.retained(), 0);
    }
}
