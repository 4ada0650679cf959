//! Injectable clocks
//!
//! Schedulers and the sync loop never read wall time directly. They take a
//! [`Clock`], so production runs on a monotonic [`SystemClock`] while tests
//! drive a [`ManualClock`] tick by tick and stay fully deterministic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::SimTime;

/// Source of the session timeline.
pub trait Clock: Send + Sync {
    fn now(&self) -> SimTime;
}

/// Monotonic clock anchored at construction time.
///
/// Immune to wall-clock adjustments; two instances share no epoch, so a
/// session uses exactly one.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> SimTime {
        SimTime::from_micros(self.origin.elapsed().as_micros() as u64)
    }
}

/// Hand-driven clock for deterministic tests.
///
/// Clones share the same underlying time, so a test can hold one handle
/// while the component under test holds another.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<SimTime>>,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock::default()
    }

    pub fn starting_at(start: SimTime) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward. Never moves it backwards.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(by);
    }

    pub fn set(&self, to: SimTime) {
        let mut now = self.now.lock();
        if to > *now {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SimTime {
        *self.now.lock()
    }
}

impl std::fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ManualClock({:?})", self.now())
    }
}
