//! Loop pacing for the simulator.
//!
//! The control loop runs one iteration per tick. [`Ticker`] sleeps out the
//! rest of a fixed period, [`ManualClock`] never sleeps and just counts, which
//! is what tests and benchmarks want.
//!
//! # Example
//!
//! ```ignore
//! use uglylab::time::{Clock, Ticker};
//! use std::time::Duration;
//!
//! let mut clock = Ticker::new(Duration::from_millis(16));
//!
//! loop {
//!     // poll commands, step...
//!     clock.tick();
//! }
//! ```

use std::time::{Duration, Instant};

/// Default loop period, roughly 60 iterations per second.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Something that paces the control loop.
pub trait Clock {
    /// Wait until the next iteration should start.
    fn tick(&mut self);

    /// Iterations completed so far.
    fn ticks(&self) -> u64;
}

/// Fixed-period wall-clock pacing.
///
/// Sleeps until the next period boundary measured from the previous tick, so
/// work done inside an iteration counts against its period. An iteration that
/// overruns starts the next one immediately.
#[derive(Debug)]
pub struct Ticker {
    /// Length of one iteration.
    period: Duration,
    /// When the timer was created.
    start: Instant,
    /// When the last tick returned.
    last_tick: Instant,
    /// Total ticks since start.
    ticks: u64,
}

impl Ticker {
    /// Create a ticker with the given period, starting now.
    pub fn new(period: Duration) -> Self {
        let now = Instant::now();
        Self {
            period,
            start: now,
            last_tick: now,
            ticks: 0,
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time since the ticker was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Clock for Ticker {
    fn tick(&mut self) {
        let busy = self.last_tick.elapsed();
        if let Some(rest) = self.period.checked_sub(busy) {
            std::thread::sleep(rest);
        }
        self.last_tick = Instant::now();
        self.ticks += 1;
    }

    #[inline]
    fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Clock that never sleeps.
#[derive(Debug, Default)]
pub struct ManualClock {
    ticks: u64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for ManualClock {
    fn tick(&mut self) {
        self.ticks += 1;
    }

    fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_new() {
        let ticker = Ticker::default();
        assert_eq!(ticker.ticks(), 0);
        assert_eq!(ticker.period(), DEFAULT_TICK);
    }

    #[test]
    fn test_ticker_sleeps_out_the_period() {
        let mut ticker = Ticker::new(Duration::from_millis(5));
        let start = Instant::now();
        ticker.tick();
        ticker.tick();
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(ticker.ticks(), 2);
    }

    #[test]
    fn test_ticker_overrun_does_not_sleep() {
        let mut ticker = Ticker::new(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let start = Instant::now();
        ticker.tick();
        assert!(start.elapsed() < Duration::from_millis(1) + Duration::from_millis(50));
        assert!(ticker.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_manual_clock_counts() {
        let mut clock = ManualClock::new();
        clock.tick();
        clock.tick();
        clock.tick();
        assert_eq!(clock.ticks(), 3);
    }
}
