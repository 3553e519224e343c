//! Per-thread block descriptors
//!
//! A descriptor accumulates everything known about one (call site, depth)
//! pair. Descriptors reference each other only through their dense ids: the
//! child and parent edge tables are indexed by the peer's id.

use crate::error::{ProfileError, Result};
use crate::mangle::mangle;
use crate::BLOCK_MAX;

/// Dense per-thread descriptor index.
pub type BlockId = usize;

/// Calls from a block into one child, and the child's total time in them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChildEdge {
    pub active: bool,
    pub calls: u64,
    pub time_total: f64,
}

/// Calls into a block from one parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentEdge {
    pub active: bool,
    pub calls: u64,
}

/// Accumulated timing for one block at one invocation depth.
#[derive(Debug, Clone)]
pub struct BlockDescriptor {
    /// Mangled name, always shorter than `NAME_MAX` bytes
    pub name: String,
    /// Stack depth of the call site when this descriptor was created (>= 1)
    pub invocation: usize,
    /// Call site owning the invocation counter this descriptor decrements
    pub site: usize,
    pub calls: u64,
    /// Seconds spent in the block's own code
    pub self_time_total: f64,
    /// Seconds spent in the block including children
    pub total_time: f64,
    pub child_edges: Box<[ChildEdge]>,
    pub parent_edges: Box<[ParentEdge]>,
}

impl BlockDescriptor {
    fn new(name: String, invocation: usize, site: usize) -> Self {
        Self {
            name,
            invocation,
            site,
            calls: 0,
            self_time_total: 0.0,
            total_time: 0.0,
            child_edges: vec![ChildEdge::default(); BLOCK_MAX].into_boxed_slice(),
            parent_edges: vec![ParentEdge::default(); BLOCK_MAX].into_boxed_slice(),
        }
    }

    /// Active child edges as `(child id, edge)`.
    pub fn children(&self) -> impl Iterator<Item = (BlockId, &ChildEdge)> {
        self.child_edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.active)
    }

    /// Active parent edges as `(parent id, edge)`.
    pub fn parents(&self) -> impl Iterator<Item = (BlockId, &ParentEdge)> {
        self.parent_edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.active)
    }

    /// Calls made to all children.
    pub fn child_calls(&self) -> u64 {
        self.children().map(|(_, edge)| edge.calls).sum()
    }

    /// Total time of all children.
    pub fn child_time_total(&self) -> f64 {
        self.children().map(|(_, edge)| edge.time_total).sum()
    }
}

/// Interned descriptor table of one thread.
#[derive(Debug, Clone, Default)]
pub struct BlockTable {
    blocks: Vec<BlockDescriptor>,
}

impl BlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a cleared descriptor for `name` at depth `invocation`.
    pub fn new_block(&mut self, name: &str, invocation: usize, site: usize) -> Result<BlockId> {
        if self.blocks.len() >= BLOCK_MAX {
            return Err(ProfileError::BlockLimit);
        }

        let id = self.blocks.len();
        let mangled = mangle(name)?;
        tracing::trace!(id, name = %mangled, invocation, "new block");
        self.blocks.push(BlockDescriptor::new(mangled, invocation, site));
        Ok(id)
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockDescriptor> {
        self.blocks.get(id)
    }

    /// Record one completed call of `child` made from `parent`.
    pub(crate) fn link(&mut self, parent: BlockId, child: BlockId, child_total: f64) {
        let edge = &mut self.blocks[parent].child_edges[child];
        edge.active = true;
        edge.calls += 1;
        edge.time_total += child_total;

        let edge = &mut self.blocks[child].parent_edges[parent];
        edge.active = true;
        edge.calls += 1;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockDescriptor> {
        self.blocks.iter()
    }

    pub fn as_slice(&self) -> &[BlockDescriptor] {
        &self.blocks
    }
}

impl std::ops::Index<BlockId> for BlockTable {
    type Output = BlockDescriptor;

    fn index(&self, id: BlockId) -> &BlockDescriptor {
        &self.blocks[id]
    }
}

impl std::ops::IndexMut<BlockId> for BlockTable {
    fn index_mut(&mut self, id: BlockId) -> &mut BlockDescriptor {
        &mut self.blocks[id]
    }
}
