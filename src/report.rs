//! Per-thread text report
//!
//! The report is built from a [`ThreadProfile`] snapshot and the session's
//! [`Calibration`], then written as plain ASCII:
//!
//! 1. A `#` preface: dump time, clock resolution, calibration summary, block
//!    count, run time, self time and overhead.
//! 2. Blocks left open at dump time, if any.
//! 3. Three tables sorted descending: total time, self time, and self time
//!    merged over recursive invocations.
//! 4. In suspect mode, blocks whose self time is within the estimated error.
//! 5. With `verbose`, a summary of every block with its child and parent edges.
//!
//! All sorting is straight insertion, so ties keep block creation order.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::block::{BlockDescriptor, BlockId};
use crate::calibration::{Calibration, CorrectionMode};
use crate::clock::FREQUENCY;
use crate::engine::ThreadProfile;
use crate::error::{ProfileError, Result};

/// Names treated as the root of the call tree, in order of precedence
pub const MAIN_NAMES: [&str; 2] = ["main-thread", "main"];

/// Report file name for a logical thread id.
///
/// ```
/// assert_eq!(blockprof::report::report_file_name(0), "profile.txt");
/// assert_eq!(blockprof::report::report_file_name(3), "profile-2.txt");
/// ```
pub fn report_file_name(logical_id: usize) -> String {
    if logical_id == 0 {
        "profile.txt".to_string()
    } else {
        format!("profile-{}.txt", logical_id - 1)
    }
}

/// Local wall-clock time as `HH:MM:SS-DD/MM/YYYY`.
pub fn dump_timestamp() -> String {
    // SAFETY: a null argument asks time() only for its return value.
    let now = unsafe { libc::time(std::ptr::null_mut()) };
    // SAFETY: tm is plain old data; all-zero is a valid value.
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    // SAFETY: both pointers refer to live locals for the duration of the call.
    if unsafe { libc::localtime_r(&now, &mut tm) }.is_null() {
        return "unknown".to_string();
    }
    format!(
        "{:02}:{:02}:{:02}-{:02}/{:02}/{:04}",
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec,
        tm.tm_mday,
        tm.tm_mon + 1,
        tm.tm_year + 1900
    )
}

/// Block ids ordered by `key`, largest first, ties in id order.
pub fn sort_descending<F>(n: usize, key: F) -> Vec<BlockId>
where
    F: Fn(BlockId) -> f64,
{
    let mut order: Vec<BlockId> = Vec::with_capacity(n);
    for id in 0..n {
        let k = key(id);
        let mut pos = order.len();
        while pos > 0 && key(order[pos - 1]) < k {
            pos -= 1;
        }
        order.insert(pos, id);
    }
    order
}

/// Self time and calls of one name summed over all its invocation depths.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecursiveTotal {
    pub time: f64,
    pub calls: u64,
}

impl RecursiveTotal {
    /// Mean self time per call, zero when never called.
    pub fn time_per_call(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.time / self.calls as f64
        }
    }

    /// Mean ticks per call, or -1 when a call averages a second or more.
    pub fn ticks_per_call(&self) -> i64 {
        let per_call = self.time_per_call();
        if per_call < 1.0 {
            (per_call * FREQUENCY as f64).round() as i64
        } else {
            -1
        }
    }
}

/// A block whose self time does not exceed its estimated measurement error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suspect {
    pub block: BlockId,
    pub error: f64,
}

/// Aggregated, sorted view of one thread's profile.
#[derive(Debug)]
pub struct ProfileReport<'a> {
    profile: &'a ThreadProfile,
    calibration: &'a Calibration,
    time_self_total: f64,
    main: BlockId,
    by_total: Vec<BlockId>,
    by_self: Vec<BlockId>,
    by_recursive: Vec<BlockId>,
    recursive: Vec<Option<RecursiveTotal>>,
}

impl<'a> ProfileReport<'a> {
    /// Aggregate `profile`; fails without a `main` or `main-thread` block.
    pub fn build(profile: &'a ThreadProfile, calibration: &'a Calibration) -> Result<Self> {
        let blocks = profile.blocks().as_slice();
        let n = blocks.len();

        let main = MAIN_NAMES
            .iter()
            .find_map(|name| blocks.iter().position(|b| b.name == *name))
            .ok_or(ProfileError::MainRegionMissing)?;

        // One merged row per name, carried by its first depth-1 descriptor
        let recursive: Vec<Option<RecursiveTotal>> = blocks
            .iter()
            .enumerate()
            .map(|(id, block)| {
                let lead = blocks
                    .iter()
                    .position(|other| other.name == block.name && other.invocation == 1);
                if lead != Some(id) {
                    return None;
                }
                Some(
                    blocks
                        .iter()
                        .filter(|other| other.name == block.name)
                        .fold(RecursiveTotal::default(), |acc, other| RecursiveTotal {
                            time: acc.time + other.self_time_total,
                            calls: acc.calls + other.calls,
                        }),
                )
            })
            .collect();

        Ok(Self {
            profile,
            calibration,
            time_self_total: profile.time_self_total(),
            main,
            by_total: sort_descending(n, |id| blocks[id].total_time),
            by_self: sort_descending(n, |id| blocks[id].self_time_total),
            by_recursive: sort_descending(n, |id| recursive[id].map_or(0.0, |r| r.time)),
            recursive,
        })
    }

    fn block(&self, id: BlockId) -> &BlockDescriptor {
        &self.profile.blocks()[id]
    }

    fn perc(&self, time: f64) -> f64 {
        if self.time_self_total > 0.0 {
            time / self.time_self_total * 100.0
        } else {
            0.0
        }
    }

    fn perc_main(&self, time: f64) -> f64 {
        let main_total = self.block(self.main).total_time;
        if main_total > 0.0 {
            time / main_total * 100.0
        } else {
            0.0
        }
    }

    /// The root block used for `%main`.
    pub fn main(&self) -> BlockId {
        self.main
    }

    pub fn time_self_total(&self) -> f64 {
        self.time_self_total
    }

    /// Run time not attributed to any block.
    pub fn overhead(&self) -> f64 {
        self.profile.time_total() - self.time_self_total
    }

    pub fn by_total(&self) -> &[BlockId] {
        &self.by_total
    }

    pub fn by_self(&self) -> &[BlockId] {
        &self.by_self
    }

    /// All block ids by merged recursive self time.
    pub fn by_recursive(&self) -> &[BlockId] {
        &self.by_recursive
    }

    /// Merged totals of a name; zero except on the first depth-1 block of that name.
    pub fn recursive_total(&self, id: BlockId) -> RecursiveTotal {
        self.recursive[id].unwrap_or_default()
    }

    /// Blocks within the estimated error (suspect mode only).
    pub fn suspects(&self) -> Vec<Suspect> {
        if self.calibration.mode != CorrectionMode::Suspect {
            return Vec::new();
        }

        self.by_self
            .iter()
            .filter_map(|&id| {
                let block = self.block(id);
                let events = (block.calls + block.child_calls()) as f64;
                let error = 4.0 * events * self.calibration.time_counter;
                (block.self_time_total <= error).then_some(Suspect { block: id, error })
            })
            .collect()
    }

    /// Write the report to `out`.
    pub fn write<W: Write>(&self, out: &mut W, verbose: bool, dumped_at: &str) -> io::Result<()> {
        self.write_preface(out, dumped_at)?;
        self.write_total_table(out)?;
        self.write_self_table(out)?;
        self.write_recursive_table(out)?;
        if self.calibration.mode == CorrectionMode::Suspect {
            self.write_suspects(out)?;
        }
        if verbose {
            self.write_summaries(out)?;
        }
        writeln!(out, "# End of profile.")
    }

    /// The report as a string.
    pub fn render(&self, verbose: bool, dumped_at: &str) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write(&mut buf, verbose, dumped_at)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Create (or truncate) `path` and write the report into it.
    pub fn write_file(&self, path: &Path, verbose: bool, dumped_at: &str) -> Result<PathBuf> {
        let io_err = |source| ProfileError::ReportIo {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut out = BufWriter::new(file);
        self.write(&mut out, verbose, dumped_at).map_err(io_err)?;
        out.flush().map_err(io_err)?;
        Ok(path.to_path_buf())
    }

    fn write_preface<W: Write>(&self, out: &mut W, dumped_at: &str) -> io::Result<()> {
        let cal = self.calibration;

        writeln!(out, "# Profile dumped at {}", dumped_at)?;
        writeln!(
            out,
            "# The frequency is {} ticks, or {:.10} secs/tick.",
            FREQUENCY,
            1.0 / FREQUENCY as f64
        )?;
        writeln!(
            out,
            "# The intrinsic profile overhead is {} ticks on average.",
            cal.counter_mean
        )?;
        writeln!(
            out,
            "# {} out of {} samples of the intrinsic profile overhead",
            cal.ncounter_largest, cal.samples
        )?;
        writeln!(
            out,
            "# ..are larger than twice the mean, with a largest deviation of {}.",
            cal.counter_largest
        )?;
        if cal.mode == CorrectionMode::Suspect {
            writeln!(
                out,
                "# Timings are uncorrected; one clock read costs about {:.10} secs.",
                cal.time_counter
            )?;
        }
        writeln!(
            out,
            "# The total number of blocks is {}.",
            self.profile.blocks().len()
        )?;

        let stack = self.profile.stack();
        if !stack.is_empty() {
            writeln!(
                out,
                "# The following blocks are not properly terminated by an END_BLOCK!"
            )?;
            for frame in stack {
                let block = self.block(frame.block);
                writeln!(out, "{} (invocation {})", block.name, block.invocation)?;
            }
            writeln!(out)?;
        }

        writeln!(
            out,
            "# The total run time was {:.10} secs.",
            self.profile.time_total()
        )?;
        writeln!(
            out,
            "# The total self time was {:.10} secs.",
            self.time_self_total
        )?;
        writeln!(
            out,
            "# The total profile overhead was {:.10} secs.",
            self.overhead()
        )?;
        writeln!(out)
    }

    fn write_total_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "# Blocks sorted by total time spent in block and children.")?;
        writeln!(out, "# The sum of total times (or the sum of the percentages)")?;
        writeln!(
            out,
            "# does not have any meaning, since children will be double counted."
        )?;
        writeln!(
            out,
            "{:<32} {:<10} {:>6} {:>16} {:>10}",
            "name", "invocation", "perc", "total time", "calls"
        )?;
        for &id in &self.by_total {
            let block = self.block(id);
            writeln!(
                out,
                "{:<32} {:<10} {:>6.2} {:>16.10} {:>10}",
                block.name,
                block.invocation,
                self.perc(block.total_time),
                block.total_time,
                block.calls
            )?;
        }
        writeln!(out)
    }

    fn write_self_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "# Blocks sorted by total time spent in own code.")?;
        writeln!(out, "# The sum of the self times is equal to the total self time.")?;
        writeln!(
            out,
            "{:<32} {:<10} {:>6} {:>16} {:>10}",
            "name", "invocation", "perc", "self time", "calls"
        )?;
        for &id in &self.by_self {
            let block = self.block(id);
            writeln!(
                out,
                "{:<32} {:<10} {:>6.2} {:>16.10} {:>10}",
                block.name,
                block.invocation,
                self.perc(block.self_time_total),
                block.self_time_total,
                block.calls
            )?;
        }
        writeln!(out)
    }

    fn write_recursive_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "# Blocks sorted by self times summed over recursive invocations."
        )?;
        writeln!(
            out,
            "{:<32} {:>6} {:>6} {:>16} {:>10} {:>16} {:>10}",
            "name", "perc", "%main", "self time", "calls", "self time/call", "ticks/call"
        )?;
        for &id in &self.by_recursive {
            let Some(merged) = self.recursive[id] else {
                continue;
            };
            let block = self.block(id);
            writeln!(
                out,
                "{:<32} {:>6.2} {:>6.2} {:>16.10} {:>10} {:>16.10} {:>10}",
                block.name,
                self.perc(merged.time),
                self.perc_main(merged.time),
                merged.time,
                merged.calls,
                merged.time_per_call(),
                merged.ticks_per_call()
            )?;
        }
        writeln!(out)
    }

    fn write_suspects<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "# Blocks whose self time is within the estimated profile error."
        )?;
        writeln!(
            out,
            "# The error is estimated as 4 * (calls + child calls) * {:.10} secs.",
            self.calibration.time_counter
        )?;
        writeln!(
            out,
            "{:<32} {:<10} {:>16} {:>16} {:>10}",
            "name", "invocation", "self time", "error", "calls"
        )?;
        for suspect in self.suspects() {
            let block = self.block(suspect.block);
            writeln!(
                out,
                "{:<32} {:<10} {:>16.10} {:>16.10} {:>10}",
                block.name, block.invocation, block.self_time_total, suspect.error, block.calls
            )?;
        }
        writeln!(out)
    }

    fn write_summaries<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for &id in &self.by_recursive {
            let block = self.block(id);

            writeln!(
                out,
                "# Summary for block {}, invocation {}.",
                block.name, block.invocation
            )?;
            writeln!(
                out,
                "Spends {:.10} secs in {} call(s), or {:.2}% of total execution time.",
                block.total_time,
                block.calls,
                self.perc(block.total_time)
            )?;
            let child_time = block.child_time_total();
            writeln!(
                out,
                "Spends {:.10} secs ({:.2}%) in own code, {:.10} secs ({:.2}%) in children.",
                block.self_time_total,
                self.perc(block.self_time_total),
                child_time,
                self.perc(child_time)
            )?;
            writeln!(out)?;

            let mut found = false;
            for (child_id, edge) in block.children() {
                found = true;
                let child = self.block(child_id);
                writeln!(
                    out,
                    "Spends {:.10} secs in {} call(s) to {}, invocation {}.",
                    edge.time_total, edge.calls, child.name, child.invocation
                )?;
            }
            if !found {
                writeln!(out, "No children were found.")?;
            }

            let mut found = false;
            for (parent_id, edge) in block.parents() {
                found = true;
                let parent = self.block(parent_id);
                writeln!(
                    out,
                    "Is called {} time(s) from {}, invocation {}.",
                    edge.calls, parent.name, parent.invocation
                )?;
            }
            if !found {
                writeln!(out, "No parents were found.")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
