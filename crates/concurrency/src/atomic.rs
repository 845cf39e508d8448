//! Atomic composition scopes
//!
//! An [`AtomicComposition`] is the transaction a compose call runs in. It
//! holds three things:
//!
//! - a staged value table keyed by `(OwnerId, key)`, visible to code that is
//!   handed the scope (or a nested scope) but not to anyone else
//! - revert actions, run in reverse order if the scope is dropped without
//!   being completed
//! - complete actions, run in registration order when the outermost scope
//!   completes
//!
//! Scopes nest: a child created with `AtomicComposition::new(Some(&parent))`
//! sees the parent's staged values, and completing the child hands its
//! values and actions to the parent instead of committing them.
//!
//! The scope is passed explicitly by reference through every call that needs
//! staged visibility. It is single-threaded (`!Sync`); concurrent compose
//! calls each get their own scope.
//!
//! # Example
//!
//! ```
//! use mosaic_concurrency::{AtomicComposition, OwnerId};
//!
//! let owner = OwnerId::next();
//! let outer = AtomicComposition::new(None);
//! outer.set_value(owner, "parts", 1u32);
//! {
//!     let inner = AtomicComposition::new(Some(&outer));
//!     assert_eq!(inner.get_value::<u32>(owner, "parts"), Some(1));
//!     inner.set_value(owner, "parts", 2u32);
//!     inner.complete().unwrap();
//! }
//! assert_eq!(outer.get_value::<u32>(owner, "parts"), Some(2));
//! ```

use mosaic_core::{CompositionErrors, MosaicResult};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Identity of a participant that stages values in a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

impl OwnerId {
    /// Allocate a process-unique owner id
    pub fn next() -> Self {
        OwnerId(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Action run when the outermost scope completes
pub type CompleteAction = Box<dyn FnOnce() -> MosaicResult<()>>;

/// Action run when a scope is abandoned
pub type RevertAction = Box<dyn FnOnce()>;

type SlotKey = (OwnerId, &'static str);

#[derive(Default)]
struct ScopeState {
    values: FxHashMap<SlotKey, Box<dyn Any>>,
    complete_actions: Vec<CompleteAction>,
    revert_actions: Vec<RevertAction>,
    completed: bool,
}

/// Transaction scope with staged values, revert and complete actions
pub struct AtomicComposition<'p> {
    parent: Option<&'p AtomicComposition<'p>>,
    state: RefCell<ScopeState>,
}

impl<'p> AtomicComposition<'p> {
    /// Open a scope, nested inside `parent` when given
    pub fn new(parent: Option<&'p AtomicComposition<'p>>) -> Self {
        Self {
            parent,
            state: RefCell::new(ScopeState::default()),
        }
    }

    /// Enclosing scope, if any
    pub fn parent(&self) -> Option<&'p AtomicComposition<'p>> {
        self.parent
    }

    /// Check whether this is the outermost scope
    pub fn is_outermost(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of enclosing scopes
    pub fn depth(&self) -> usize {
        self.parent.map_or(0, |p| p.depth() + 1)
    }

    /// Look up a staged value, innermost scope first
    ///
    /// Returns `None` when no scope in the chain staged the slot, or when the
    /// staged value is not a `T`.
    pub fn get_value<T: Clone + 'static>(&self, owner: OwnerId, key: &'static str) -> Option<T> {
        {
            let state = self.state.borrow();
            if let Some(value) = state.values.get(&(owner, key)) {
                return value.downcast_ref::<T>().cloned();
            }
        }
        self.parent.and_then(|p| p.get_value(owner, key))
    }

    /// Look up a staged value, falling back to `default`
    pub fn get_value_or<T: Clone + 'static>(&self, owner: OwnerId, key: &'static str, default: T) -> T {
        self.get_value(owner, key).unwrap_or(default)
    }

    /// Stage a value in this scope only
    pub fn set_value<T: 'static>(&self, owner: OwnerId, key: &'static str, value: T) {
        self.state
            .borrow_mut()
            .values
            .insert((owner, key), Box::new(value));
    }

    /// Queue an action for when the outermost scope completes
    pub fn add_complete_action<F>(&self, action: F)
    where
        F: FnOnce() -> MosaicResult<()> + 'static,
    {
        self.state
            .borrow_mut()
            .complete_actions
            .push(Box::new(action));
    }

    /// Queue an action for when this scope (or an enclosing one) is abandoned
    pub fn add_revert_action<F>(&self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.state
            .borrow_mut()
            .revert_actions
            .push(Box::new(action));
    }

    /// Complete the scope
    ///
    /// A nested scope moves its staged values, complete actions and revert
    /// actions into the parent and returns `Ok(())`. The outermost scope runs
    /// every complete action once, in registration order, and reports the
    /// failures of all of them.
    pub fn complete(self) -> MosaicResult<()> {
        let (values, complete_actions, revert_actions) = {
            let mut state = self.state.borrow_mut();
            state.completed = true;
            (
                std::mem::take(&mut state.values),
                std::mem::take(&mut state.complete_actions),
                std::mem::take(&mut state.revert_actions),
            )
        };

        match self.parent {
            Some(parent) => {
                let mut parent_state = parent.state.borrow_mut();
                parent_state.values.extend(values);
                parent_state.complete_actions.extend(complete_actions);
                parent_state.revert_actions.extend(revert_actions);
                Ok(())
            }
            None => {
                drop(revert_actions);
                drop(values);
                let mut errors = CompositionErrors::new();
                for action in complete_actions {
                    if let Err(e) = action() {
                        errors.merge(e);
                    }
                }
                errors.into_composition()
            }
        }
    }
}

impl Drop for AtomicComposition<'_> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.completed {
            return;
        }
        let reverts = std::mem::take(&mut state.revert_actions);
        debug!(
            target: "mosaic::atomic",
            depth = self.depth(),
            revert_actions = reverts.len(),
            "Atomic composition abandoned, reverting"
        );
        for action in reverts.into_iter().rev() {
            action();
        }
    }
}

impl fmt::Debug for AtomicComposition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("AtomicComposition")
            .field("depth", &self.depth())
            .field("staged_values", &state.values.len())
            .field("complete_actions", &state.complete_actions.len())
            .field("revert_actions", &state.revert_actions.len())
            .field("completed", &state.completed)
            .finish()
    }
}
