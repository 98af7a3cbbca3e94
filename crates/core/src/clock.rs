// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so staleness windows, retry backoff, and tick cadence
//! are testable without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of time.
///
/// `epoch_ms` is wall-clock milliseconds since the Unix epoch, used for
/// event timestamps and property-cache freshness. Values read through one
/// clock are monotonically non-decreasing.
pub trait Clock: Clone + Send + Sync + 'static {
    fn epoch_ms(&self) -> u64;

    fn elapsed_since(&self, earlier_ms: u64) -> Duration {
        Duration::from_millis(self.epoch_ms().saturating_sub(earlier_ms))
    }
}

/// Real system clock, monotonicity enforced across reads.
#[derive(Clone, Default)]
pub struct SystemClock {
    floor: Arc<AtomicU64>,
}

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        // Wall clocks can step backwards; never let callers observe that.
        self.floor.fetch_max(now, Ordering::AcqRel).max(now)
    }
}

/// Controllable clock for tests.
#[derive(Clone)]
pub struct FakeClock {
    now_ms: Arc<AtomicU64>,
}

impl FakeClock {
    /// Starts at an arbitrary non-zero epoch so timestamps are visibly fake.
    pub fn new() -> Self {
        Self { now_ms: Arc::new(AtomicU64::new(1_700_000_000_000)) }
    }

    pub fn at(epoch_ms: u64) -> Self {
        Self { now_ms: Arc::new(AtomicU64::new(epoch_ms)) }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
