//! Composition lock and snapshot cell
//!
//! [`CompositionLock`] serializes compose calls across threads when a
//! provider runs in thread-safe mode. The mutex is re-entrant so that
//! composition started from code running inside a compose call on the same
//! thread can proceed.
//!
//! [`SnapshotCell`] holds an immutable snapshot behind an `Arc`. Readers take
//! a clone of the `Arc` under a read lock and never observe a partially built
//! value; the only write is a whole-value swap.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// CompositionLock
// ============================================================================

/// Optional re-entrant lock around composition
pub struct CompositionLock {
    thread_safe: bool,
    composition: ReentrantMutex<()>,
}

impl CompositionLock {
    /// Create a lock; with `thread_safe == false` locking is a no-op
    pub fn new(thread_safe: bool) -> Self {
        Self {
            thread_safe,
            composition: ReentrantMutex::new(()),
        }
    }

    /// Whether the lock actually serializes
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    /// Acquire the composition lock
    ///
    /// Returns `None` when the lock is not thread-safe.
    pub fn lock_composition(&self) -> Option<ReentrantMutexGuard<'_, ()>> {
        if self.thread_safe {
            Some(self.composition.lock())
        } else {
            None
        }
    }
}

impl fmt::Debug for CompositionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionLock")
            .field("thread_safe", &self.thread_safe)
            .finish()
    }
}

// ============================================================================
// SnapshotCell
// ============================================================================

/// Swappable `Arc` snapshot
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
}

impl<T> SnapshotCell<T> {
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// Current snapshot
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Replace the snapshot, returning the previous one
    pub fn store(&self, value: Arc<T>) -> Arc<T> {
        std::mem::replace(&mut *self.current.write(), value)
    }
}

impl<T: Default> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SnapshotCell").field(&*self.load()).finish()
    }
}
