//! Process-wide session and per-thread state
//!
//! `init_profile` creates a session: configuration, calibration results and
//! the thread registry, all behind one mutex. Each thread keeps its
//! [`ThreadProfile`] in a thread-local slot tagged with the session
//! generation, so the hot path never locks; the mutex is taken once per
//! thread to obtain a logical id, and again by `dump_profile`.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::calibration::{Calibration, Correction};
use crate::clock::ThreadCpuClock;
use crate::config::ProfileConfig;
use crate::engine::ThreadProfile;
use crate::error::{OrFatal, ProfileError, Result};
use crate::registry::{current_tid, ThreadRegistry};
use crate::report::{dump_timestamp, report_file_name, ProfileReport};
use crate::THREAD_MAX;

/// A `begin_block!` expansion.
///
/// Each site gets a process-wide index on first use; per-thread recursion
/// state for the site lives in the thread's profile under that index.
#[derive(Debug)]
pub struct CallSite {
    name: &'static str,
    index: AtomicUsize,
}

static NEXT_SITE: AtomicUsize = AtomicUsize::new(1);

impl CallSite {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            index: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Dense index of this site, assigned on first call.
    pub fn index(&self) -> usize {
        let index = self.index.load(Ordering::Relaxed);
        if index != 0 {
            return index - 1;
        }
        let fresh = NEXT_SITE.fetch_add(1, Ordering::Relaxed);
        match self
            .index
            .compare_exchange(0, fresh, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => fresh - 1,
            Err(existing) => existing - 1,
        }
    }
}

struct Session {
    config: ProfileConfig,
    calibration: Calibration,
    registry: ThreadRegistry,
}

static SESSION: Mutex<Option<Session>> = Mutex::new(None);

/// Bumped by every `init_profile`; zero means no session yet.
static GENERATION: AtomicU64 = AtomicU64::new(0);

fn session() -> MutexGuard<'static, Option<Session>> {
    SESSION.lock().unwrap_or_else(|e| e.into_inner())
}

struct LocalProfile {
    generation: u64,
    profile: ThreadProfile,
}

thread_local! {
    static LOCAL: RefCell<Option<LocalProfile>> = const { RefCell::new(None) };
}

/// Register the calling thread with the current session.
fn attach(generation: u64) -> Result<LocalProfile> {
    let mut guard = session();
    let session = guard.as_mut().ok_or(ProfileError::NotInitialized)?;
    let logical_id = session.registry.logical_id(current_tid())?;
    tracing::debug!(logical_id, "thread attached");
    Ok(LocalProfile {
        generation,
        profile: ThreadProfile::new(logical_id, session.config.correction()),
    })
}

/// Run `f` on the calling thread's profile, attaching it first if needed.
fn with_profile<T>(f: impl FnOnce(&mut ThreadProfile) -> Result<T>) -> Result<T> {
    let generation = GENERATION.load(Ordering::Acquire);
    if generation == 0 {
        return Err(ProfileError::NotInitialized);
    }

    LOCAL.with(|cell| {
        let mut local = cell.borrow_mut();
        let stale = local.as_ref().map_or(true, |l| l.generation != generation);
        if stale {
            *local = Some(attach(generation)?);
        }
        match local.as_mut() {
            Some(l) => f(&mut l.profile),
            None => Err(ProfileError::NotInitialized),
        }
    })
}

/// Start a session, returning any error instead of exiting.
///
/// Registers the calling thread as logical id 0, removes stale reports and
/// calibrates the clock. Calling it again starts a fresh session; threads
/// drop their old state on their next profiler call.
pub fn try_init_profile_with(config: ProfileConfig) -> Result<()> {
    config.validate()?;

    if config.remove_stale_reports {
        remove_stale_reports(&config.output_dir);
    }

    let calibration = Calibration::measure(
        &ThreadCpuClock,
        config.calibration_samples,
        config.correction_mode,
    )?;

    {
        let mut guard = session();
        *guard = Some(Session {
            config,
            calibration,
            registry: ThreadRegistry::new(),
        });
    }
    let generation = GENERATION.fetch_add(1, Ordering::AcqRel) + 1;
    tracing::debug!(generation, "profiling session started");

    // Claim logical id 0 for the initialising thread
    with_profile(|_| Ok(()))
}

/// Start a session configured from the environment, exiting on failure.
#[track_caller]
pub fn init_profile() {
    ProfileConfig::from_env()
        .and_then(try_init_profile_with)
        .or_fatal()
}

/// Start a session with `config`, exiting on failure.
#[track_caller]
pub fn init_profile_with(config: ProfileConfig) {
    try_init_profile_with(config).or_fatal()
}

fn remove_stale_reports(dir: &std::path::Path) {
    for id in 0..=THREAD_MAX {
        let path = dir.join(report_file_name(id));
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale report"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), "cannot remove stale report: {}", e),
        }
    }
}

/// Open a block at `site`. Used by `begin_block!`.
#[track_caller]
#[inline]
pub fn begin(site: &'static CallSite) {
    with_profile(|p| p.begin(site.index(), site.name(), &ThreadCpuClock).map(|_| ())).or_fatal()
}

/// Close the innermost block. Used by `end_block!`.
#[track_caller]
#[inline]
pub fn end() {
    with_profile(|p| p.end(&ThreadCpuClock)).or_fatal()
}

/// Write the calling thread's report, returning its path.
pub fn try_dump_profile(verbose: bool) -> Result<PathBuf> {
    let (calibration, output_dir) = {
        let guard = session();
        let session = guard.as_ref().ok_or(ProfileError::NotInitialized)?;
        (session.calibration, session.config.output_dir.clone())
    };

    with_profile(|profile| {
        if profile.depth() > 0 {
            tracing::warn!(
                logical_id = profile.logical_id(),
                open = profile.depth(),
                "dumping profile with unterminated blocks"
            );
        }

        let report = ProfileReport::build(profile, &calibration)?;
        let path = output_dir.join(report_file_name(profile.logical_id()));
        report.write_file(&path, verbose, &dump_timestamp())?;
        tracing::info!(path = %path.display(), blocks = profile.blocks().len(), "profile written");
        Ok(path)
    })
}

/// Write the calling thread's report, exiting on failure.
#[track_caller]
pub fn dump_profile(verbose: bool) {
    try_dump_profile(verbose).or_fatal();
}

/// Copy of the calling thread's profile, if it is attached to the session.
pub fn thread_snapshot() -> Option<ThreadProfile> {
    let generation = GENERATION.load(Ordering::Acquire);
    LOCAL.with(|cell| {
        cell.borrow()
            .as_ref()
            .filter(|l| l.generation == generation)
            .map(|l| l.profile.clone())
    })
}

/// Calibration of the current session.
pub fn session_calibration() -> Option<Calibration> {
    session().as_ref().map(|s| s.calibration)
}

/// Correction applied by threads attached to the current session.
pub fn session_correction() -> Option<Correction> {
    session().as_ref().map(|s| s.config.correction())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_call_site_index_is_stable() {
        static SITE: CallSite = CallSite::new("site");
        let first = SITE.index();
        assert_eq!(SITE.index(), first);
        let other = std::thread::spawn(|| SITE.index()).join().unwrap();
        assert_eq!(other, first);
    }

    #[test]
    fn test_distinct_sites_get_distinct_indices() {
        static A: CallSite = CallSite::new("a");
        static B: CallSite = CallSite::new("b");
        assert_ne!(A.index(), B.index());
    }

    #[test]
    #[serial]
    fn test_session_lifecycle() {
        let dir = tempfile::TempDir::new().unwrap();
        try_init_profile_with(ProfileConfig::quick().with_output_dir(dir.path())).unwrap();

        let snapshot = thread_snapshot().unwrap();
        assert_eq!(snapshot.logical_id(), 0);
        assert_eq!(snapshot.depth(), 0);
        assert!(session_calibration().is_some());
        assert_eq!(session_correction(), Some(Correction::default()));

        static MAIN: CallSite = CallSite::new("main");
        begin(&MAIN);
        assert_eq!(thread_snapshot().unwrap().depth(), 1);
        end();

        let path = try_dump_profile(false).unwrap();
        assert_eq!(path, dir.path().join("profile.txt"));
        assert!(path.exists());
    }

    #[test]
    #[serial]
    fn test_reinit_discards_thread_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ProfileConfig::quick().with_output_dir(dir.path());

        try_init_profile_with(config.clone()).unwrap();
        static SITE: CallSite = CallSite::new("main");
        begin(&SITE);
        end();
        assert_eq!(thread_snapshot().unwrap().blocks().len(), 1);

        try_init_profile_with(config).unwrap();
        assert_eq!(thread_snapshot().unwrap().blocks().len(), 0);
    }

    #[test]
    #[serial]
    fn test_stale_reports_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("profile.txt"), "old").unwrap();
        std::fs::write(dir.path().join("profile-3.txt"), "old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        try_init_profile_with(ProfileConfig::quick().with_output_dir(dir.path())).unwrap();

        assert!(!dir.path().join("profile.txt").exists());
        assert!(!dir.path().join("profile-3.txt").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    #[serial]
    fn test_dump_without_main_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        try_init_profile_with(ProfileConfig::quick().with_output_dir(dir.path())).unwrap();
        static SITE: CallSite = CallSite::new("worker");
        begin(&SITE);
        end();
        assert!(matches!(
            try_dump_profile(false),
            Err(ProfileError::MainRegionMissing)
        ));
        assert!(!dir.path().join("profile.txt").exists());
    }
}
