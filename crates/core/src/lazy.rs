//! One-shot deferred value cell
//!
//! [`LazyValue`] runs its getter at most once. The cell moves through explicit
//! states:
//!
//! ```text
//! Pending --force--> Forcing --ok--> Ready(value)
//!                           \--err--> Failed(error)
//! ```
//!
//! The getter runs without the state lock held, so it may force other cells.
//! Forcing a cell from inside its own getter on the same thread is reported as
//! a [`MosaicError::CompositionCycle`]; forcing it from another thread blocks
//! until the first forcer finishes.

use crate::error::{MosaicError, MosaicResult};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// A value produced by an export
pub type ExportedValue = Arc<dyn Any + Send + Sync>;

/// Boxed getter stored in a pending cell
pub type ValueGetter = Box<dyn FnOnce() -> MosaicResult<ExportedValue> + Send>;

enum CellState {
    Pending(ValueGetter),
    Forcing(ThreadId),
    Ready(ExportedValue),
    Failed(MosaicError),
}

/// Memoized, thread-safe deferred value
pub struct LazyValue {
    state: Mutex<CellState>,
    forced: Condvar,
}

impl LazyValue {
    /// Create a cell that runs `getter` on first force
    pub fn new<F>(getter: F) -> Self
    where
        F: FnOnce() -> MosaicResult<ExportedValue> + Send + 'static,
    {
        Self {
            state: Mutex::new(CellState::Pending(Box::new(getter))),
            forced: Condvar::new(),
        }
    }

    /// Create a cell that is already forced
    pub fn ready(value: ExportedValue) -> Self {
        Self {
            state: Mutex::new(CellState::Ready(value)),
            forced: Condvar::new(),
        }
    }

    /// Force the cell and return its value or the memoized error
    pub fn force(&self) -> MosaicResult<ExportedValue> {
        let me = thread::current().id();
        let getter = {
            let mut state = self.state.lock();
            loop {
                match std::mem::replace(&mut *state, CellState::Forcing(me)) {
                    CellState::Pending(getter) => break getter,
                    CellState::Ready(value) => {
                        *state = CellState::Ready(Arc::clone(&value));
                        return Ok(value);
                    }
                    CellState::Failed(error) => {
                        *state = CellState::Failed(error.clone());
                        return Err(error);
                    }
                    CellState::Forcing(owner) => {
                        *state = CellState::Forcing(owner);
                        if owner == me {
                            return Err(MosaicError::CompositionCycle(
                                "value requested while it is being produced".to_string(),
                            ));
                        }
                        self.forced.wait(&mut state);
                    }
                }
            }
        };

        let result = getter();

        let mut state = self.state.lock();
        *state = match &result {
            Ok(value) => CellState::Ready(Arc::clone(value)),
            Err(error) => CellState::Failed(error.clone()),
        };
        drop(state);
        self.forced.notify_all();
        result
    }

    /// Check whether the cell has produced a value or an error
    pub fn is_forced(&self) -> bool {
        matches!(
            &*self.state.lock(),
            CellState::Ready(_) | CellState::Failed(_)
        )
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            CellState::Pending(_) => "pending",
            CellState::Forcing(_) => "forcing",
            CellState::Ready(_) => "ready",
            CellState::Failed(_) => "failed",
        };
        f.debug_struct("LazyValue").field("state", &state).finish()
    }
}
