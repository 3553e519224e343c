//! Timed-region engine
//!
//! Each thread owns one [`ThreadProfile`]: a stack of open frames, the
//! descriptor table, and the per-call-site recursion state. Time flows as
//! follows:
//!
//! - Self time is charged to the innermost open frame only. Opening a child
//!   closes the parent's current self-time interval; closing the child
//!   reopens it.
//! - Total time of a closed frame is its self time plus the total time of
//!   its children, and is added to the parent frame.
//! - Every interval is bounded by two stamps published around the engine's
//!   own work: the outer stamp (read before) and the begin stamp (read
//!   after), so bookkeeping is never charged to user code.

use std::collections::HashMap;

use crate::block::{BlockDescriptor, BlockId, BlockTable};
use crate::calibration::Correction;
use crate::clock::{secs, Clock};
use crate::error::{ProfileError, Result};
use crate::{RECURSE_MAX, STACK_MAX};

/// One open (or just closed) block on the stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub block: BlockId,
    pub count_begin: u64,
    pub count_end: u64,
    pub self_time: f64,
    pub total_time: f64,
}

impl Frame {
    fn open(block: BlockId, stamp: u64) -> Self {
        Self {
            block,
            count_begin: stamp,
            count_end: stamp,
            self_time: 0.0,
            total_time: 0.0,
        }
    }
}

/// Recursion state of one call site within one thread.
#[derive(Debug, Clone)]
struct SiteState {
    block_id: [Option<BlockId>; RECURSE_MAX],
    invocation: usize,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            block_id: [None; RECURSE_MAX],
            invocation: 0,
        }
    }
}

/// All profiling state of one thread.
#[derive(Debug, Clone)]
pub struct ThreadProfile {
    logical_id: usize,
    correction: Correction,
    stack: Vec<Frame>,
    blocks: BlockTable,
    /// Keyed by process-wide site index; only sites this thread entered.
    sites: HashMap<usize, SiteState>,
    outer_stamp: u64,
    overhead_begin: u64,
    time_total: f64,
    last_closed: Option<Frame>,
}

impl ThreadProfile {
    pub fn new(logical_id: usize, correction: Correction) -> Self {
        Self {
            logical_id,
            correction,
            stack: Vec::with_capacity(STACK_MAX),
            blocks: BlockTable::new(),
            sites: HashMap::new(),
            outer_stamp: 0,
            overhead_begin: 0,
            time_total: 0.0,
            last_closed: None,
        }
    }

    /// Open a block at `site`: outer stamp, engine work, begin stamp.
    pub fn begin<C: Clock>(&mut self, site: usize, name: &str, clock: &C) -> Result<BlockId> {
        let stamp = clock.now()?;
        let id = self.enter(site, name, stamp, clock)?;
        let begin = clock.now()?;
        self.publish_begin_stamp(begin);
        Ok(id)
    }

    /// Close the innermost block: outer stamp, engine work, resume stamp.
    pub fn end<C: Clock>(&mut self, clock: &C) -> Result<()> {
        let stamp = clock.now()?;
        self.exit(stamp, clock)?;
        let resume = clock.now()?;
        self.publish_begin_stamp(resume);
        Ok(())
    }

    /// Engine half of `begin`, given the already-read outer stamp.
    pub fn enter<C: Clock>(
        &mut self,
        site: usize,
        name: &str,
        outer_stamp: u64,
        clock: &C,
    ) -> Result<BlockId> {
        self.outer_stamp = outer_stamp;
        let id = self.resolve(site, name)?;
        self.begin_block(id, clock)?;
        Ok(id)
    }

    /// Engine half of `end`, given the already-read outer stamp.
    pub fn exit<C: Clock>(&mut self, outer_stamp: u64, clock: &C) -> Result<()> {
        self.outer_stamp = outer_stamp;
        self.end_block(clock)
    }

    /// Record the start of the top frame's next self-time interval.
    ///
    /// With an empty stack the stamp has no reader and is dropped.
    pub fn publish_begin_stamp(&mut self, stamp: u64) {
        if let Some(top) = self.stack.last_mut() {
            top.count_begin = stamp;
        }
    }

    /// Descriptor for the next invocation depth of `site`, created on first use.
    fn resolve(&mut self, site: usize, name: &str) -> Result<BlockId> {
        let state = self.sites.entry(site).or_default();

        let depth = state.invocation + 1;
        if depth >= RECURSE_MAX {
            return Err(ProfileError::RecursionLimit {
                name: name.to_string(),
            });
        }

        let id = match state.block_id[depth] {
            Some(id) => id,
            None => {
                let id = self.blocks.new_block(name, depth, site)?;
                state.block_id[depth] = Some(id);
                id
            }
        };
        state.invocation = depth;
        Ok(id)
    }

    pub(crate) fn begin_block<C: Clock>(&mut self, id: BlockId, clock: &C) -> Result<()> {
        debug_assert!(id < self.blocks.len());

        if let Some(top) = self.stack.last_mut() {
            top.count_end = self.outer_stamp;
            let delta = top.count_end.saturating_sub(top.count_begin);
            top.self_time += secs(self.correction.correct(delta, clock)?);
        } else {
            self.overhead_begin = self.outer_stamp;
        }

        if self.stack.len() >= STACK_MAX {
            return Err(ProfileError::StackOverflow);
        }
        self.stack.push(Frame::open(id, self.outer_stamp));
        Ok(())
    }

    pub(crate) fn end_block<C: Clock>(&mut self, clock: &C) -> Result<()> {
        let mut frame = self.stack.pop().ok_or(ProfileError::UnmatchedEnd)?;

        frame.count_end = self.outer_stamp;
        let delta = frame.count_end.saturating_sub(frame.count_begin);
        frame.self_time += secs(self.correction.correct(delta, clock)?);
        frame.total_time += frame.self_time;

        let block = &mut self.blocks[frame.block];
        block.calls += 1;
        block.self_time_total += frame.self_time;
        block.total_time += frame.total_time;

        let negative = || ProfileError::NegativeInvocation {
            name: block.name.clone(),
        };
        let site = self.sites.get_mut(&block.site).ok_or_else(negative)?;
        site.invocation = site.invocation.checked_sub(1).ok_or_else(negative)?;

        if let Some(parent) = self.stack.last_mut() {
            parent.total_time += frame.total_time;
            let parent_id = parent.block;
            self.blocks.link(parent_id, frame.block, frame.total_time);
        } else {
            self.time_total += secs(self.outer_stamp.saturating_sub(self.overhead_begin));
        }

        self.last_closed = Some(frame);
        Ok(())
    }

    pub fn logical_id(&self) -> usize {
        self.logical_id
    }

    pub fn correction(&self) -> Correction {
        self.correction
    }

    pub fn blocks(&self) -> &BlockTable {
        &self.blocks
    }

    /// Open frames, outermost first.
    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Seconds between entering and leaving outermost blocks, summed.
    pub fn time_total(&self) -> f64 {
        self.time_total
    }

    /// Sum of self time over all descriptors.
    pub fn time_self_total(&self) -> f64 {
        self.blocks.iter().map(|b| b.self_time_total).sum()
    }

    /// The most recently closed frame.
    pub fn last_closed(&self) -> Option<&Frame> {
        self.last_closed.as_ref()
    }

    /// First descriptor named `name`.
    pub fn find(&self, name: &str) -> Option<(BlockId, &BlockDescriptor)> {
        self.blocks.iter().enumerate().find(|(_, b)| b.name == name)
    }
}
