//! clock.rs
//! Monotonic time source for the cooperative loop.
//!
//! All periodic obligations compare elapsed time against `Clock::now()`;
//! blocking waits (drive steps, settle delays, yields) go through `Clock::sleep`
//! so tests can run the whole controller on simulated time.

use parking_lot::Mutex;
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

pub trait Clock: Send {
    /// Time since the clock was created. Never goes backwards.
    fn now(&self) -> Duration;

    /// Blocks the loop for `d`.
    fn sleep(&mut self, d: Duration);
}

/// Wall-clock implementation backed by `Instant` and a spin sleeper.
pub struct MonotonicClock {
    start: Instant,
    sleeper: SpinSleeper,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            // 100 µs native accuracy, then yield-spin for the remainder
            sleeper: SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, d: Duration) {
        if !d.is_zero() {
            self.sleeper.sleep(d);
        }
    }
}

/// Simulated clock: `sleep` advances time instantly.
///
/// Clones share the same time base, so a test can keep a handle while the
/// controller owns another one inside its hardware context.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        *self.now.lock() += d;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    fn sleep(&mut self, d: Duration) {
        self.advance(d);
    }
}

/// Drift-free periodic deadline.
///
/// The next deadline advances by whole periods, so late ticks do not push the
/// schedule back. If the loop falls more than one full period behind, the
/// timer resynchronises instead of firing a burst of catch-up slots.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    period: Duration,
    next_due: Duration,
    missed: u64,
}

impl PeriodicTimer {
    /// Timer whose first deadline is `first_due`.
    pub fn starting_at(period: Duration, first_due: Duration) -> Self {
        Self {
            period,
            next_due: first_due,
            missed: 0,
        }
    }

    /// Returns true (and schedules the next slot) when `now` has reached the deadline.
    pub fn due(&mut self, now: Duration) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due += self.period;
        if self.next_due <= now {
            self.missed += 1;
            self.next_due = now + self.period;
        }
        true
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Slots skipped by resynchronisation.
    pub fn missed(&self) -> u64 {
        self.missed
    }
}
