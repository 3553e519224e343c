//! Built-in validation workload
//!
//! A fixed tree of empty blocks nested one to three levels deep inside
//! `main`. Empty blocks do no work of their own, so with the per-sample
//! correction working their self times should sit near zero and nearly all
//! run time should show up as profile overhead.

use crate::{begin_block, end_block};

/// Names of the blocks opened by [`run_workload`], outermost first per branch.
pub const WORKLOAD_BLOCKS: [&str; 12] = [
    "main",
    "profile-0-0",
    "profile-1-1",
    "profile-1-1-0",
    "profile-2-2",
    "profile-2-2-1-0",
    "profile-2-2-2-0",
    "profile-3-1",
    "profile-3-3-1-3",
    "profile-3-3-1-3-1-0",
    "profile-3-3-1-3-2-0",
    "profile-3-3-1-3-3-0",
];

/// Blocks opened per iteration of the workload loop.
pub const BLOCKS_PER_ITERATION: u64 = 11;

/// Run the workload for `iterations` rounds inside a `main` block.
///
/// The calling thread must belong to an initialised session.
pub fn run_workload(iterations: u64) {
    begin_block!("main");

    for _ in 0..iterations {
        begin_block!("profile-0-0");
        end_block!();

        begin_block!("profile-1-1");
        begin_block!("profile-1-1-0");
        end_block!();
        end_block!();

        begin_block!("profile-2-2");
        begin_block!("profile-2-2-1-0");
        end_block!();
        begin_block!("profile-2-2-2-0");
        end_block!();
        end_block!();

        begin_block!("profile-3-1");
        begin_block!("profile-3-3-1-3");
        begin_block!("profile-3-3-1-3-1-0");
        end_block!();
        begin_block!("profile-3-3-1-3-2-0");
        end_block!();
        begin_block!("profile-3-3-1-3-3-0");
        end_block!();
        end_block!();
        end_block!();
    }

    end_block!();
}
