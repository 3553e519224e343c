//! Error taxonomy for the profiler
//!
//! Every error here is fatal for instrumented code: the `begin_block!` and
//! `end_block!` macros and the non-`try_` API route them through [`fatal`],
//! which prints a one-line diagnostic and exits. The `try_` functions hand the
//! same errors back to the caller instead.

use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

use crate::{BLOCK_MAX, MANGLE_MAX, NAME_MAX, RECURSE_MAX, STACK_MAX, THREAD_MAX};

/// Errors raised by the profiler
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("thread registry exhausted: more than {} threads profiled", THREAD_MAX)]
    ThreadLimit,

    #[error("block table exhausted: more than {} blocks in one thread", BLOCK_MAX)]
    BlockLimit,

    #[error("call stack overflow: more than {} nested blocks", STACK_MAX)]
    StackOverflow,

    #[error("block '{name}' recursed deeper than {}", RECURSE_MAX - 1)]
    RecursionLimit { name: String },

    #[error("block name of {len} bytes exceeds the mangling limit of {}", MANGLE_MAX - 1)]
    NameTooLong { len: usize },

    #[error("block name '{name}' cannot be shortened below {} bytes", NAME_MAX)]
    NameUnmangleable { name: String },

    #[error("end_block without matching begin_block")]
    UnmatchedEnd,

    #[error("invocation counter of block '{name}' went negative")]
    NegativeInvocation { name: String },

    #[error("failed to read the thread CPU clock: {0}")]
    Clock(#[from] nix::Error),

    #[error("profiler used before init_profile")]
    NotInitialized,

    #[error("failed to write report {}: {source}", path.display())]
    ReportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("block main or main-thread not found")]
    MainRegionMissing,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to read configuration {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProfileError>;

/// Format the single diagnostic line written before a fatal exit.
pub fn diagnostic(location: &Location<'_>, err: &ProfileError) -> String {
    format!("{}::{}:{}", location.file(), location.line(), err)
}

/// Report `err` against the caller's source location and exit the process.
#[track_caller]
#[cold]
pub fn fatal(err: ProfileError) -> ! {
    let location = Location::caller();
    tracing::error!(file = location.file(), line = location.line(), "{}", err);
    eprintln!("{}", diagnostic(location, &err));
    std::process::exit(libc::EXIT_FAILURE)
}

/// Unwrap a profiler result or exit with a diagnostic at the caller's location.
pub trait OrFatal<T> {
    fn or_fatal(self) -> T;
}

impl<T> OrFatal<T> for Result<T> {
    #[track_caller]
    fn or_fatal(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(err),
        }
    }
}
