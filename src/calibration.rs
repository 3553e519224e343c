//! Clock-read overhead calibration
//!
//! Reading the clock is not free. Every measured interval includes the tail
//! of the read that opened it and the head of the read that closed it, which
//! matters for blocks that run only a few hundred nanoseconds.
//!
//! Two strategies are supported:
//! - `PerSample` (default): each interval is corrected by a fresh, very short
//!   estimate of the read cost, clamped at zero.
//! - `Suspect`: intervals are left raw; calibration estimates the cost of one
//!   read, and the report flags blocks whose self time is within the
//!   estimated error.

use std::hint::black_box;

use serde::{Deserialize, Serialize};

use crate::clock::{secs, Clock};
use crate::error::Result;

/// Iterations of the init-time calibration loops.
pub const NCALL: u64 = 1_000_000;

/// Back-to-back read pairs used by each per-sample correction.
pub const NCALIBRATION: u32 = 2;

/// How measured intervals are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionMode {
    /// Subtract a per-sample estimate of the clock-read cost
    #[default]
    PerSample,
    /// Keep raw intervals and flag blocks within the estimated error
    Suspect,
}

impl std::str::FromStr for CorrectionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "per-sample" => Ok(Self::PerSample),
            "suspect" => Ok(Self::Suspect),
            other => Err(format!(
                "unknown correction mode '{other}' (expected per-sample or suspect)"
            )),
        }
    }
}

/// Welford's online mean and variance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Welford {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, x: f64) {
        self.n += 1;
        let previous = self.mean;
        self.mean = previous + (x - previous) / self.n as f64;
        self.m2 += (x - previous) * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, zero below two observations.
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            self.m2 / (self.n - 1) as f64
        }
    }
}

/// Cost of one back-to-back pair of clock reads.
#[inline]
fn read_pair<C: Clock>(clock: &C) -> Result<i64> {
    let stamp = black_box(clock.now()?);
    let dummy = black_box(clock.now()?);
    Ok(dummy as i64 - stamp as i64)
}

/// Process-wide calibration results, written once per session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub mode: CorrectionMode,
    /// Samples taken by each calibration loop
    pub samples: u64,
    /// Rounded mean cost of a clock read, in ticks
    pub counter_mean: i64,
    /// Fixed heuristic `counter_mean / 3`, not the measured deviation
    pub counter_sigma: i64,
    /// Measured standard deviation of the read cost, in ticks
    pub counter_stddev: f64,
    /// Samples above `counter_mean + 3 * counter_sigma`
    pub ncounter_largest: u64,
    /// Largest such sample
    pub counter_largest: i64,
    /// Seconds per empty loop iteration (suspect mode)
    pub time_for_loop: f64,
    /// Seconds per clock read net of loop cost (suspect mode)
    pub time_counter: f64,
}

impl Calibration {
    /// Characterise the clock-read cost of `clock` with `samples` iterations.
    pub fn measure<C: Clock>(clock: &C, samples: u64, mode: CorrectionMode) -> Result<Self> {
        let samples = samples.max(1);

        let mut stats = Welford::new();
        for _ in 0..samples {
            stats.update(read_pair(clock)? as f64);
        }
        let counter_mean = stats.mean().round() as i64;
        let counter_sigma = (stats.mean() / 3.0).round() as i64;
        let threshold = counter_mean + 3 * counter_sigma;

        let mut ncounter_largest = 0;
        let mut counter_largest = 0;
        for _ in 0..samples {
            let delta = read_pair(clock)?;
            if delta > threshold {
                ncounter_largest += 1;
                counter_largest = counter_largest.max(delta);
            }
        }

        let (time_for_loop, time_counter) = match mode {
            CorrectionMode::PerSample => (0.0, 0.0),
            CorrectionMode::Suspect => loop_and_counter_cost(clock, samples)?,
        };

        let calibration = Self {
            mode,
            samples,
            counter_mean,
            counter_sigma,
            counter_stddev: stats.variance().sqrt(),
            ncounter_largest,
            counter_largest,
            time_for_loop,
            time_counter,
        };
        tracing::debug!(?calibration, "clock calibrated");
        Ok(calibration)
    }

    /// Mean overhead in seconds.
    pub fn counter_mean_secs(&self) -> f64 {
        secs(self.counter_mean.max(0) as u64)
    }
}

/// Seconds per empty loop iteration, and per clock read net of the loop.
fn loop_and_counter_cost<C: Clock>(clock: &C, samples: u64) -> Result<(f64, f64)> {
    let begin = clock.now()?;
    for i in 0..samples {
        black_box(i);
    }
    let end = clock.now()?;
    let time_for_loop = secs(end.saturating_sub(begin)) / samples as f64;

    let begin = clock.now()?;
    for _ in 0..samples {
        black_box(clock.now()?);
    }
    let end = clock.now()?;
    let time_counter =
        (secs(end.saturating_sub(begin)) / samples as f64 - time_for_loop).max(0.0);

    Ok((time_for_loop, time_counter))
}

/// Per-interval correction applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub mode: CorrectionMode,
    pub samples: u32,
}

impl Default for Correction {
    fn default() -> Self {
        Self {
            mode: CorrectionMode::PerSample,
            samples: NCALIBRATION,
        }
    }
}

impl Correction {
    /// Remove the expected clock-read cost from `delta`, never going negative.
    ///
    /// The estimate is re-sampled on every call so it tracks local jitter.
    pub fn correct<C: Clock>(&self, delta: u64, clock: &C) -> Result<u64> {
        if self.mode == CorrectionMode::Suspect {
            return Ok(delta);
        }

        let mut stats = Welford::new();
        for _ in 0..self.samples.max(1) {
            stats.update(read_pair(clock)? as f64);
        }
        let overhead = stats.mean().round() as i64;
        Ok((delta as i64 - overhead).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, ThreadCpuClock};

    #[test]
    fn test_welford_matches_two_pass() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut stats = Welford::new();
        for x in data {
            stats.update(x);
        }
        assert_eq!(stats.count(), 8);
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        // Sample variance: sum of squares 32 over 7
        assert!((stats.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_welford_single_sample() {
        let mut stats = Welford::new();
        stats.update(3.0);
        assert_eq!(stats.mean(), 3.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn test_calibration_on_manual_clock() {
        let clock = ManualClock::new(0, 40);
        let calibration = Calibration::measure(&clock, 1000, CorrectionMode::PerSample).unwrap();
        assert_eq!(calibration.counter_mean, 40);
        assert_eq!(calibration.counter_sigma, 13);
        assert_eq!(calibration.ncounter_largest, 0);
        assert_eq!(calibration.counter_largest, 0);
        assert_eq!(calibration.counter_stddev, 0.0);
        assert_eq!(calibration.time_counter, 0.0);
        assert!((calibration.counter_mean_secs() - 40e-9).abs() < 1e-15);
    }

    #[test]
    fn test_suspect_calibration_measures_read_cost() {
        let clock = ManualClock::new(0, 40);
        let calibration = Calibration::measure(&clock, 100, CorrectionMode::Suspect).unwrap();
        // The manual clock only charges reads, so the loop itself is free
        assert!((calibration.time_counter - 40e-9).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_on_thread_clock() {
        let calibration =
            Calibration::measure(&ThreadCpuClock, 10_000, CorrectionMode::PerSample).unwrap();
        assert!(calibration.counter_mean >= 0);
        assert!(calibration.ncounter_largest <= calibration.samples);
        if calibration.ncounter_largest > 0 {
            assert!(
                calibration.counter_largest
                    > calibration.counter_mean + 3 * calibration.counter_sigma
            );
        }
    }

    #[test]
    fn test_correction_subtracts_read_cost() {
        let clock = ManualClock::new(0, 25);
        let correction = Correction::default();
        assert_eq!(correction.correct(1_000, &clock).unwrap(), 975);
    }

    #[test]
    fn test_correction_clamps_at_zero() {
        let clock = ManualClock::new(0, 25);
        let correction = Correction::default();
        assert_eq!(correction.correct(10, &clock).unwrap(), 0);
        assert_eq!(correction.correct(0, &clock).unwrap(), 0);
    }

    #[test]
    fn test_suspect_mode_keeps_raw_delta() {
        let clock = ManualClock::new(0, 25);
        let correction = Correction {
            mode: CorrectionMode::Suspect,
            samples: NCALIBRATION,
        };
        assert_eq!(correction.correct(10, &clock).unwrap(), 10);
        // No reads were spent
        assert_eq!(clock.peek(), 0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "per-sample".parse::<CorrectionMode>().unwrap(),
            CorrectionMode::PerSample
        );
        assert_eq!(
            "suspect".parse::<CorrectionMode>().unwrap(),
            CorrectionMode::Suspect
        );
        assert!("sometimes".parse::<CorrectionMode>().is_err());
    }
}
