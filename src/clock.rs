// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Time source abstraction.
//!
//! Every time-dependent component (cache TTLs, dedup cleanup, echo windows)
//! reads the wall clock through [`Clock`] so tests can drive time explicitly.
//!
//! # Example
//!
//! ```
//! use catalog_sync::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::default();
//! let t0 = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!((clock.now() - t0).num_seconds(), 5);
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests and simulations.
///
/// Clones share the same underlying instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Clock positioned at `secs` seconds after the Unix epoch.
    pub fn at_secs(secs: i64) -> Self {
        Self::new(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_secs(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Elapsed time between two instants, saturating at zero when `later`
/// precedes `earlier` (clock skew, manual clock rewinds).
pub(crate) fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

/// Absolute distance between two instants.
pub(crate) fn distance(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a <= b {
        elapsed_between(a, b)
    } else {
        elapsed_between(b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::at_secs(100);
        let other = clock.clone();
        clock.advance(Duration::from_secs(3));
        assert_eq!(other.now().timestamp(), 103);
    }

    #[test]
    fn test_elapsed_saturates() {
        let a = Utc.timestamp_opt(10, 0).unwrap();
        let b = Utc.timestamp_opt(5, 0).unwrap();
        assert_eq!(elapsed_between(a, b), Duration::ZERO);
        assert_eq!(elapsed_between(b, a), Duration::from_secs(5));
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Utc.timestamp_opt(10, 0).unwrap();
        let b = Utc.timestamp_opt(16, 0).unwrap();
        assert_eq!(distance(a, b), distance(b, a));
        assert_eq!(distance(a, b), Duration::from_secs(6));
    }
}
