//! Timestamp sources.
//!
//! A profiler takes every timestamp from one clock instance, so readings
//! stay comparable for the life of the process. The trait seam lets tests
//! and trace replay drive time by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic timestamp source, nanosecond granularity, non-decreasing.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

/// Production clock backed by `std::time::Instant`, anchored at creation.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Hand-driven clock for tests and trace replay.
///
/// Clones share the same underlying cell, so a driver can advance time on
/// its handle while the profiler reads through its own.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now_ns: u64) {
        self.now.set(now_ns);
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now.set(self.now.get() + delta_ns);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.get()
    }
}
