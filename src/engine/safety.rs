//! # Access tracking
//!
//! Runtime bookkeeping of which component columns are currently borrowed by
//! worker tasks. Inside a single thread Rust's borrow rules already separate
//! readers from writers (views borrow the world shared or exclusively); this
//! module covers the cross-task case, where a scheduler hands chunk ranges of
//! the same group to several workers.
//!
//! The rules are those of a reader/writer lock per column:
//!
//! - any number of concurrent readers of a column,
//! - a single writer excludes every other reader and writer of that column,
//! - borrows of *different* columns never interact.
//!
//! Unlike a lock, acquisition never waits. A conflicting request fails with
//! [`AccessError::Conflict`] and the caller decides what to do (usually run the
//! task later). The storage itself is never locked.
//!
//! ## State encoding
//!
//! | State | Meaning |
//! |------:|--------|
//! | `0` | free |
//! | `1` | one writer |
//! | `>= 2` | `state - 1` readers |

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::engine::buffer::{BufferAlias, BufferCell};
use crate::engine::error::{AccessError, StaleViewError};
use crate::engine::types::TypeIndex;


/// Per-column borrow state.
#[derive(Default)]
pub struct AccessTracker {
    states: Vec<AtomicUsize>,
}

impl AccessTracker {
    /// Creates a tracker with no columns.
    pub fn new() -> Self { Self::default() }

    /// Grows the tracker so that every type index below `len` has a state.
    pub fn ensure(&mut self, len: usize) {
        while self.states.len() < len {
            self.states.push(AtomicUsize::new(0));
        }
    }

    #[inline]
    fn state(&self, type_index: TypeIndex) -> Result<&AtomicUsize, AccessError> {
        self.states
            .get(type_index as usize)
            .ok_or(AccessError::Conflict { type_index })
    }

    /// Returns `true` when nothing borrows `type_index`.
    pub fn is_free(&self, type_index: TypeIndex) -> bool {
        self.states
            .get(type_index as usize)
            .map_or(true, |s| s.load(Ordering::Acquire) == 0)
    }

    /// Takes a shared borrow of `type_index` unless a writer holds it.
    pub fn try_acquire_read(&self, type_index: TypeIndex) -> Result<(), AccessError> {
        let state = self.state(type_index)?;
        let mut current = state.load(Ordering::Acquire);
        loop {
            if current == 1 {
                return Err(AccessError::Conflict { type_index });
            }
            let next = if current == 0 { 2 } else { current + 1 };
            match state.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases a shared borrow. The last reader moves the state straight
    /// from `2` to `0`, so the writer state `1` is never observed.
    pub fn release_read(&self, type_index: TypeIndex) {
        if let Ok(state) = self.state(type_index) {
            let released = state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match current {
                2 => Some(0),
                n if n > 2 => Some(n - 1),
                _ => None,
            });
            debug_assert!(released.is_ok(), "releasing a read borrow that is not held");
        }
    }

    /// Takes the exclusive borrow of `type_index` if it is free.
    pub fn try_acquire_write(&self, type_index: TypeIndex) -> Result<(), AccessError> {
        self.state(type_index)?
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| AccessError::Conflict { type_index })
    }

    /// Releases the exclusive borrow.
    pub fn release_write(&self, type_index: TypeIndex) {
        if let Ok(state) = self.state(type_index) {
            let previous = state.swap(0, Ordering::AcqRel);
            debug_assert_eq!(previous, 1);
        }
    }
}

/// Borrows of a whole read/write set, released on drop.
///
/// Type indices are sorted and deduplicated first; writes are taken before
/// reads. If any borrow fails, the ones already taken are released before the
/// error is returned.
pub struct AccessGuard<'a> {
    tracker: &'a AccessTracker,
    reads: Vec<TypeIndex>,
    writes: Vec<TypeIndex>,
}

impl<'a> AccessGuard<'a> {
    /// Acquires every borrow in `reads` and `writes`.
    pub fn try_new(
        tracker: &'a AccessTracker,
        reads: &[TypeIndex],
        writes: &[TypeIndex],
    ) -> Result<Self, AccessError> {
        let mut r = reads.to_vec();
        let mut w = writes.to_vec();
        r.sort_unstable();
        w.sort_unstable();
        r.dedup();
        w.dedup();

        if let Some(&type_index) = r.iter().find(|t| w.binary_search(t).is_ok()) {
            return Err(AccessError::ReadAndWrite { type_index });
        }

        let mut guard = Self { tracker, reads: Vec::with_capacity(r.len()), writes: Vec::with_capacity(w.len()) };
        for type_index in w {
            tracker.try_acquire_write(type_index)?;
            guard.writes.push(type_index);
        }
        for type_index in r {
            tracker.try_acquire_read(type_index)?;
            guard.reads.push(type_index);
        }
        Ok(guard)
    }

    /// Columns held for reading.
    pub fn reads(&self) -> &[TypeIndex] { &self.reads }

    /// Columns held for writing.
    pub fn writes(&self) -> &[TypeIndex] { &self.writes }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        for &type_index in self.reads.iter().rev() { self.tracker.release_read(type_index); }
        for &type_index in self.writes.iter().rev() { self.tracker.release_write(type_index); }
    }
}

/// Switch for the generation checks on buffer aliases.
///
/// When disabled every check passes; the bounds checks of the storage itself
/// remain in force either way.
#[derive(Clone, Copy, Debug)]
pub struct SafetyHandle {
    enabled: bool,
}

impl SafetyHandle {
    /// Creates a handle; `enabled` mirrors `WorldConfig::safety_checks`.
    pub fn new(enabled: bool) -> Self { Self { enabled } }

    /// Returns `true` when checks are active.
    #[inline]
    pub fn is_enabled(&self) -> bool { self.enabled }

    /// Verifies that `alias` still refers to the storage of `cell`.
    #[inline]
    pub fn check_alias(&self, alias: &BufferAlias, cell: &BufferCell) -> Result<(), StaleViewError> {
        if self.enabled { alias.check(cell) } else { Ok(()) }
    }
}
