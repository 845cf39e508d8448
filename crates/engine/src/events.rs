//! Export change notifications
//!
//! Every provider owns a [`ChangeNotifier`] with two listener lists:
//!
//! - **changing**: raised before a batch commits, with the batch's
//!   [`AtomicComposition`]. Listeners stage their reactions in that scope
//!   and may veto the batch by returning an error.
//! - **changed**: raised after commit, without a scope.
//!
//! Listener lists are copied out before listeners run, so a listener may
//! subscribe or unsubscribe without deadlocking.

use mosaic_concurrency::AtomicComposition;
use mosaic_core::{CompositionErrors, ExportDefinition, MosaicResult};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Definitions that appear or disappear in one change
pub struct ExportsChangeEvent<'a> {
    /// Export definitions becoming available
    pub added: Vec<ExportDefinition>,
    /// Export definitions going away
    pub removed: Vec<ExportDefinition>,
    /// Scope of the change; `None` once committed
    pub atomic: Option<&'a AtomicComposition<'a>>,
}

impl<'a> ExportsChangeEvent<'a> {
    /// Event raised inside a scope
    pub fn changing(
        added: Vec<ExportDefinition>,
        removed: Vec<ExportDefinition>,
        atomic: &'a AtomicComposition<'a>,
    ) -> Self {
        Self {
            added,
            removed,
            atomic: Some(atomic),
        }
    }

    /// Iterate added then removed definitions
    pub fn changed_definitions(&self) -> impl Iterator<Item = &ExportDefinition> {
        self.added.iter().chain(self.removed.iter())
    }

    /// Check whether the event carries no definitions
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl ExportsChangeEvent<'static> {
    /// Event raised after commit
    pub fn changed(added: Vec<ExportDefinition>, removed: Vec<ExportDefinition>) -> Self {
        Self {
            added,
            removed,
            atomic: None,
        }
    }
}

impl fmt::Debug for ExportsChangeEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportsChangeEvent")
            .field("added", &self.added)
            .field("removed", &self.removed)
            .field("in_transaction", &self.atomic.is_some())
            .finish()
    }
}

/// Callback registered on a notifier
pub type ChangeListener = Arc<dyn Fn(&ExportsChangeEvent<'_>) -> MosaicResult<()> + Send + Sync>;

/// Handle used to unsubscribe a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Changing/changed listener registry
#[derive(Default)]
pub struct ChangeNotifier {
    changing: RwLock<Vec<(ListenerId, ChangeListener)>>,
    changed: RwLock<Vec<(ListenerId, ChangeListener)>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    /// Empty notifier
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe to pre-commit changes
    pub fn on_changing<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ExportsChangeEvent<'_>) -> MosaicResult<()> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.changing.write().push((id, Arc::new(listener)));
        id
    }

    /// Subscribe to post-commit changes
    pub fn on_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ExportsChangeEvent<'_>) -> MosaicResult<()> + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.changed.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener from either list
    ///
    /// Returns `true` if a listener was removed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut removed = false;
        for list in [&self.changing, &self.changed] {
            let mut list = list.write();
            let before = list.len();
            list.retain(|(listener_id, _)| *listener_id != id);
            removed |= list.len() != before;
        }
        removed
    }

    /// Whether anyone listens for pre-commit changes
    pub fn has_changing_listeners(&self) -> bool {
        !self.changing.read().is_empty()
    }

    /// Raise a pre-commit change; the first error vetoes and stops delivery
    pub fn raise_changing(&self, event: &ExportsChangeEvent<'_>) -> MosaicResult<()> {
        for listener in Self::listeners(&self.changing) {
            listener(event)?;
        }
        Ok(())
    }

    /// Raise a post-commit change; every listener runs and errors aggregate
    pub fn raise_changed(&self, event: &ExportsChangeEvent<'_>) -> MosaicResult<()> {
        let mut errors = CompositionErrors::new();
        for listener in Self::listeners(&self.changed) {
            if let Err(e) = listener(event) {
                errors.merge(e);
            }
        }
        errors.into_composition()
    }

    fn listeners(list: &RwLock<Vec<(ListenerId, ChangeListener)>>) -> Vec<ChangeListener> {
        list.read().iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("changing", &self.changing.read().len())
            .field("changed", &self.changed.read().len())
            .finish()
    }
}
