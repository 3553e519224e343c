//! Per-thread CPU clock
//!
//! All stamps are integer nanoseconds of CPU time consumed by the calling
//! thread, read from `CLOCK_THREAD_CPUTIME_ID`. Sleeps and blocking I/O do
//! not advance it.

use std::cell::Cell;

use nix::time::{clock_gettime, ClockId};

use crate::error::Result;

/// Ticks per second of every [`Clock`] in this crate.
pub const FREQUENCY: u64 = 1_000_000_000;

/// Convert a tick count to seconds.
pub fn secs(ticks: u64) -> f64 {
    ticks as f64 / FREQUENCY as f64
}

/// Source of monotonic per-thread tick stamps.
pub trait Clock {
    /// Read the current stamp.
    fn now(&self) -> Result<u64>;
}

/// The OS thread CPU-time clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadCpuClock;

impl Clock for ThreadCpuClock {
    #[inline]
    fn now(&self) -> Result<u64> {
        let ts = clock_gettime(ClockId::CLOCK_THREAD_CPUTIME_ID)?;
        Ok(ts.tv_sec() as u64 * FREQUENCY + ts.tv_nsec() as u64)
    }
}

/// Deterministic clock for tests and dry runs.
///
/// Every read returns the current value and then advances it by `read_cost`,
/// modelling the time a real clock read consumes. [`ManualClock::advance`]
/// models work done between reads.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    read_cost: u64,
}

impl ManualClock {
    pub fn new(start: u64, read_cost: u64) -> Self {
        Self {
            now: Cell::new(start),
            read_cost,
        }
    }

    /// Advance the clock without a read.
    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get() + ticks);
    }

    /// Current value without advancing.
    pub fn peek(&self) -> u64 {
        self.now.get()
    }

    pub fn read_cost(&self) -> u64 {
        self.read_cost
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<u64> {
        let stamp = self.now.get();
        self.now.set(stamp + self.read_cost);
        Ok(stamp)
    }
}
