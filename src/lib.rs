//! blockprof - instrumentation profiler for per-thread CPU time
//!
//! Wrap regions of code in `begin_block!("name")` / `end_block!()` pairs. Each
//! thread records the CPU time spent in every region, split into self time and
//! total time along the dynamic stack of open regions, together with call
//! counts and parent/child edges. `dump_profile` writes one text report per
//! thread. The cost of reading the clock is calibrated at start-up and
//! removed from every measured interval.
//!
//! # Example
//! ```no_run
//! use blockprof::{begin_block, end_block};
//!
//! blockprof::init_profile();
//! begin_block!("main");
//! for _ in 0..3 {
//!     begin_block!("work");
//!     std::hint::black_box((0..1000u64).sum::<u64>());
//!     end_block!();
//! }
//! end_block!();
//! blockprof::dump_profile(true);
//! ```

pub mod block;
pub mod calibration;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod mangle;
pub mod profiler;
pub mod registry;
pub mod report;
pub mod validate;

pub use calibration::{Calibration, Correction, CorrectionMode};
pub use config::ProfileConfig;
pub use engine::{Frame, ThreadProfile};
pub use error::{ProfileError, Result};
pub use profiler::{
    dump_profile, init_profile, init_profile_with, thread_snapshot, try_dump_profile,
    try_init_profile_with, CallSite,
};

/// Maximum number of profiled threads
pub const THREAD_MAX: usize = 16;
/// Maximum number of blocks per thread
pub const BLOCK_MAX: usize = 100;
/// Maximum nesting depth of open blocks per thread
pub const STACK_MAX: usize = 100;
/// Bound on the recursion depth of a single call site
pub const RECURSE_MAX: usize = 100;
/// Block names are stored in fewer than this many bytes
pub const NAME_MAX: usize = 32;
/// Names of this many bytes or more are rejected outright
pub const MANGLE_MAX: usize = 256;

/// Open a named block on the calling thread.
///
/// The name must be a string literal. Each expansion is its own call site;
/// recursive entries of one site are recorded per invocation depth.
#[macro_export]
macro_rules! begin_block {
    ($name:literal) => {{
        static __BLOCKPROF_SITE: $crate::CallSite = $crate::CallSite::new($name);
        $crate::profiler::begin(&__BLOCKPROF_SITE);
    }};
}

/// Close the innermost open block on the calling thread.
#[macro_export]
macro_rules! end_block {
    () => {
        $crate::profiler::end()
    };
}
