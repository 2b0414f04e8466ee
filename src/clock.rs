//! Monotonic millisecond ticks with wraparound-tolerant arithmetic
//!
//! Long-running devices keep a free-running millisecond counter that wraps.
//! Timestamps are therefore stored as [`Ticks`] (a wrapping `u32`) and compared
//! only through [`Ticks::diff`], which interprets the wrapping difference as a
//! signed value. This stays correct across a wrap as long as the two samples
//! are less than 2^31 ms (about 24.8 days) apart.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A sample of a wrapping millisecond counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ticks(pub u32);

impl Ticks {
    /// Signed difference `self - earlier` over the 2^32 modulus (pure function)
    pub fn diff(self, earlier: Ticks) -> i64 {
        i64::from(self.0.wrapping_sub(earlier.0) as i32)
    }

    /// Ticks advanced by `duration`, wrapping at the counter width (pure function)
    pub fn add(self, duration: Duration) -> Ticks {
        Ticks(self.0.wrapping_add(duration_to_ticks(duration)))
    }

    /// Whether at least `interval` has elapsed between `earlier` and `self`
    pub fn elapsed_at_least(self, earlier: Ticks, interval: Duration) -> bool {
        self.diff(earlier) >= i64::from(duration_to_ticks(interval))
    }
}

/// Convert a duration to whole milliseconds, truncated to the counter width
pub fn duration_to_ticks(duration: Duration) -> u32 {
    duration.as_millis() as u32
}

/// Source of monotonic ticks
pub trait Clock: Send + Sync {
    fn now(&self) -> Ticks;
}

/// Clock backed by [`Instant`], truncated to a wrapping `u32` counter
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    offset: u32,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: 0,
        }
    }

    /// Start the counter at `start` instead of zero
    pub fn starting_at(start: Ticks) -> Self {
        Self {
            origin: Instant::now(),
            offset: start.0,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Ticks {
        Ticks(
            self.offset
                .wrapping_add(duration_to_ticks(self.origin.elapsed())),
        )
    }
}

/// Manually driven clock; clones share the same counter
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Ticks) -> Self {
        Self {
            ticks: Arc::new(AtomicU32::new(start.0)),
        }
    }

    pub fn set(&self, ticks: Ticks) {
        self.ticks.store(ticks.0, Ordering::SeqCst);
    }

    pub fn advance(&self, duration: Duration) {
        let step = duration_to_ticks(duration);
        // fetch_add wraps on overflow, which is the behavior we want
        self.ticks.fetch_add(step, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ticks {
        Ticks(self.ticks.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_without_wrap() {
        assert_eq!(Ticks(1_500).diff(Ticks(1_000)), 500);
        assert_eq!(Ticks(1_000).diff(Ticks(1_500)), -500);
        assert_eq!(Ticks(42).diff(Ticks(42)), 0);
    }

    #[test]
    fn test_diff_across_wrap() {
        let before = Ticks(u32::MAX - 99);
        let after = before.add(Duration::from_millis(250));
        assert_eq!(after, Ticks(150));
        assert_eq!(after.diff(before), 250);
        assert_eq!(before.diff(after), -250);
    }

    #[test]
    fn test_elapsed_at_least_boundary() {
        let start = Ticks(u32::MAX - 10);
        let interval = Duration::from_millis(30_000);
        assert!(!start.add(Duration::from_millis(29_999)).elapsed_at_least(start, interval));
        assert!(start.add(interval).elapsed_at_least(start, interval));
    }

    #[test]
    fn test_manual_clock_clones_share_counter() {
        let clock = ManualClock::new();
        let shared = clock.clone();
        clock.advance(Duration::from_secs(2));
        assert_eq!(shared.now(), Ticks(2_000));

        shared.set(Ticks(u32::MAX));
        clock.advance(Duration::from_millis(1));
        assert_eq!(clock.now(), Ticks(0));
    }

    #[test]
    fn test_monotonic_clock_offset() {
        let clock = MonotonicClock::starting_at(Ticks(u32::MAX - 5));
        let first = clock.now();
        std::thread::sleep(Duration::from_millis(20));
        let second = clock.now();
        assert!(second.diff(first) >= 20);
    }
}
