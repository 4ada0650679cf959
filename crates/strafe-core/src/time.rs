//! Time primitives for the Strafe engine
//!
//! All timelines in the engine are expressed as [`SimTime`]: microseconds
//! since an arbitrary session epoch, monotonic, never wall-clock. The queue
//! scheduler and the simulation tick both stamp events with it, which keeps
//! wait-time math and interpolation math on one axis.

use std::ops::{Add, Sub};
use std::time::Duration;

/// A point on the session timeline, in microseconds since epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        SimTime(micros)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        SimTime(millis * 1000)
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        SimTime((secs * 1_000_000.0) as u64)
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0 / 1000
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        SimTime(self.0.saturating_add(duration.as_micros() as u64))
    }

    #[inline]
    pub fn saturating_sub(self, duration: Duration) -> Self {
        SimTime(self.0.saturating_sub(duration.as_micros() as u64))
    }

    /// Elapsed time since an earlier point; zero if `earlier` is in the future.
    #[inline]
    pub fn since(self, earlier: SimTime) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        SimTime(self.0 + rhs.as_micros() as u64)
    }
}

impl Sub<Duration> for SimTime {
    type Output = SimTime;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        SimTime(self.0.saturating_sub(rhs.as_micros() as u64))
    }
}

impl Sub<SimTime> for SimTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: SimTime) -> Self::Output {
        Duration::from_micros(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Debug for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sim({:.3}ms)", self.0 as f64 / 1000.0)
    }
}

/// Fractional position of `at` between `start` and `end`, clamped to [0, 1].
///
/// Degenerate ranges (`end <= start`) collapse to 1.0 so callers always land
/// on the newer endpoint.
#[inline]
pub fn interp_fraction(start: SimTime, end: SimTime, at: SimTime) -> f32 {
    if end <= start {
        return 1.0;
    }
    let span = (end.0 - start.0) as f64;
    let offset = at.0.saturating_sub(start.0) as f64;
    (offset / span).clamp(0.0, 1.0) as f32
}
