//! Thread registry: OS thread ids to dense logical ids
//!
//! The registry itself is plain data; callers keep it behind the session
//! mutex and cache the result per thread.

use crate::error::{ProfileError, Result};
use crate::THREAD_MAX;

/// Maps OS thread ids to logical ids in `[0, THREAD_MAX)`.
#[derive(Debug, Clone, Default)]
pub struct ThreadRegistry {
    tids: [Option<i32>; THREAD_MAX],
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `tid`, claiming the first free slot on a miss.
    pub fn logical_id(&mut self, tid: i32) -> Result<usize> {
        if let Some(id) = self.tids.iter().position(|slot| *slot == Some(tid)) {
            return Ok(id);
        }

        let id = self
            .tids
            .iter()
            .position(Option::is_none)
            .ok_or(ProfileError::ThreadLimit)?;
        self.tids[id] = Some(tid);
        Ok(id)
    }

    /// Number of claimed slots.
    pub fn len(&self) -> usize {
        self.tids.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// OS id of the calling thread.
pub fn current_tid() -> i32 {
    nix::unistd::gettid().as_raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_thread_gets_zero() {
        let mut registry = ThreadRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.logical_id(4242).unwrap(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_is_stable() {
        let mut registry = ThreadRegistry::new();
        assert_eq!(registry.logical_id(10).unwrap(), 0);
        assert_eq!(registry.logical_id(20).unwrap(), 1);
        assert_eq!(registry.logical_id(10).unwrap(), 0);
        assert_eq!(registry.logical_id(20).unwrap(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut registry = ThreadRegistry::new();
        for tid in 0..THREAD_MAX as i32 {
            assert_eq!(registry.logical_id(tid + 100).unwrap(), tid as usize);
        }
        assert!(matches!(
            registry.logical_id(9999),
            Err(ProfileError::ThreadLimit)
        ));
        // Known threads still resolve once the table is full
        assert_eq!(registry.logical_id(100).unwrap(), 0);
    }

    #[test]
    fn test_current_tid_differs_across_threads() {
        let main_tid = current_tid();
        let other = std::thread::spawn(current_tid).join().unwrap();
        assert_ne!(main_tid, other);
    }
}
