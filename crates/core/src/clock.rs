// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time source behind every timestamp in the system.
//!
//! Claim expiry, heartbeat deadlines, and team budgets all compare
//! epoch-millisecond stamps, so anything that stamps or sweeps takes a
//! `Clock` rather than reading the system time directly.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Clone + Send + Sync {
    /// Monotonic reading, for measuring elapsed intervals.
    fn now(&self) -> Instant;
    /// Wall-clock milliseconds since the Unix epoch, for persisted stamps.
    fn epoch_ms(&self) -> u64;
}

#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually driven clock. Time moves only through [`FakeClock::advance`],
/// so expiry and budget paths can be tested without sleeping.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeTime>>,
}

struct FakeTime {
    instant: Instant,
    epoch_ms: u64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                epoch_ms: 1_000_000,
            })),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut time = self.inner.lock();
        time.instant += duration;
        time.epoch_ms += duration.as_millis() as u64;
    }

    pub fn set_epoch_ms(&self, ms: u64) {
        self.inner.lock().epoch_ms = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.inner.lock().instant
    }

    fn epoch_ms(&self) -> u64 {
        self.inner.lock().epoch_ms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
