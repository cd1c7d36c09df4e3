//! Monotonic time source for the cooperative loop.
//!
//! All scheduling decisions compare timestamps expressed as a [`Duration`]
//! since boot. Production code uses [`SystemClock`]; tests drive the state
//! machines with a [`ManualClock`] so that every timeout is deterministic.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of "time since boot" plus a bounded sleep.
///
/// `sleep` is only used by the two explicitly time-boxed foreground waits
/// (network bootstrap and user-initiated connect) and by the loop's idle
/// yield. State machine ticks never call it.
pub trait Clock {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block the current context for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Create a clock whose zero is "now".
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock for deterministic tests.
///
/// `sleep` advances the clock instead of blocking, so a bounded wait of 30
/// seconds completes instantly while still observing every intermediate
/// timestamp.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    /// Create a clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
