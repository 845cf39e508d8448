//! Import engine
//!
//! The import engine resolves a part's imports against a source provider and
//! injects the results. It keeps a small state machine per part:
//!
//! ```text
//! NotSet -> Previewing -> Previewed -> PreExportSatisfying -> PreExportSatisfied
//!        -> PostExportSatisfying -> Composed
//! ```
//!
//! # Phases
//!
//! - **preview** runs inside a batch's [`AtomicComposition`]: every import is
//!   resolved against the candidate graph and its cardinality checked. The
//!   resolved exports are saved for the satisfy step. Every state change is
//!   undone by a revert action if the batch is abandoned.
//! - **satisfy** runs after commit: prerequisite imports first, then the rest,
//!   then `on_composed`.
//! - **release** forgets a removed part; `on_released` runs after commit.
//!
//! # Recomposition
//!
//! The engine listens for "exports changing" on its source. Every tracked
//! part with an import matching a changed definition is recomposed: a
//! non-recomposable import vetoes the batch, a recomposable one is
//! re-resolved in the batch's scope and re-injected when the batch commits.
//! One event per batch means at most one injection per import per batch.
//!
//! No lock is held while part code or providers run.

use crate::config::CompositionOptions;
use crate::events::ExportsChangeEvent;
use crate::metrics::CompositionMetrics;
use crate::provider::{ExportProvider, ExportSelection};
use mosaic_concurrency::AtomicComposition;
use mosaic_core::{
    CompositionError, CompositionErrorKind, CompositionErrors, Export, ImportDefinition,
    MosaicError, MosaicResult, PartError, PartRef,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, warn};

/// Import satisfaction state of one part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportState {
    /// Nothing has happened yet
    #[default]
    NotSet,
    /// Imports are being previewed
    Previewing,
    /// Imports were previewed and their exports saved
    Previewed,
    /// Prerequisite imports are being set
    PreExportSatisfying,
    /// Prerequisite imports are set; the part may produce exports
    PreExportSatisfied,
    /// Remaining imports are being set
    PostExportSatisfying,
    /// All imports are set and `on_composed` has run
    Composed,
}

#[derive(Clone, Default)]
struct PartManager {
    state: ImportState,
    saved: FxHashMap<ImportDefinition, Vec<Export>>,
}

#[derive(Default)]
struct EngineState {
    managers: FxHashMap<PartRef, PartManager>,
    /// Parts watched for recomposition, in the order they were first previewed
    /// or satisfied.
    tracked: Vec<PartRef>,
    depths: FxHashMap<ThreadId, usize>,
}

type Recomposition = Vec<(ImportDefinition, Vec<Export>)>;

/// Resolves and injects part imports
pub struct ImportEngine {
    me: Weak<ImportEngine>,
    source: Weak<dyn ExportProvider>,
    options: CompositionOptions,
    metrics: Arc<CompositionMetrics>,
    state: Mutex<EngineState>,
}

impl ImportEngine {
    /// Create an engine resolving against `source` and subscribe to its changes
    pub fn new(
        source: &Arc<dyn ExportProvider>,
        options: CompositionOptions,
        metrics: Arc<CompositionMetrics>,
    ) -> Arc<Self> {
        let engine = Arc::new_cyclic(|me| ImportEngine {
            me: me.clone(),
            source: Arc::downgrade(source),
            options,
            metrics,
            state: Mutex::new(EngineState::default()),
        });

        let weak = Arc::downgrade(&engine);
        source.notifier().on_changing(move |event| match weak.upgrade() {
            Some(engine) => engine.on_exports_changing(event),
            None => Ok(()),
        });
        engine
    }

    fn source(&self) -> MosaicResult<Arc<dyn ExportProvider>> {
        self.source
            .upgrade()
            .ok_or(MosaicError::Disposed("source export provider"))
    }

    /// Current state of a part
    pub fn state_of(&self, part: &PartRef) -> ImportState {
        self.state
            .lock()
            .managers
            .get(part)
            .map(|m| m.state)
            .unwrap_or_default()
    }

    /// Whether a part is watched for recomposition
    pub fn is_tracked(&self, part: &PartRef) -> bool {
        self.state.lock().tracked.contains(part)
    }

    // ========================================================================
    // Preview
    // ========================================================================

    /// Resolve every import of `part` against the candidate graph in `atomic`
    ///
    /// # Errors
    ///
    /// Returns `ChangeRejected` listing every import that cannot be satisfied.
    pub fn preview_imports(&self, part: &PartRef, atomic: &AtomicComposition<'_>) -> MosaicResult<()> {
        if self.options.disable_silent_rejection || part.import_definitions().is_empty() {
            return Ok(());
        }

        let previous = {
            let mut state = self.state.lock();
            let previous = state.managers.get(part).cloned();
            match previous.as_ref().map(|m| m.state) {
                Some(ImportState::Previewing) => {
                    return Err(MosaicError::rejected(
                        CompositionError::new(
                            CompositionErrorKind::ImportCycle,
                            "imports were requested while they were being previewed",
                        )
                        .with_part(part.display_name()),
                    ));
                }
                Some(ImportState::NotSet) | None => {}
                Some(_) => return Ok(()),
            }
            state.managers.insert(
                part.clone(),
                PartManager {
                    state: ImportState::Previewing,
                    saved: FxHashMap::default(),
                },
            );
            previous
        };
        self.restore_on_revert(atomic, part, previous);

        let source = self.source()?;
        let mut errors = CompositionErrors::new();
        let mut saved = FxHashMap::default();
        for import in part.import_definitions() {
            match source.try_get_exports(import, Some(atomic)) {
                Ok(ExportSelection::Matched(exports)) => {
                    saved.insert(import.clone(), exports);
                }
                Ok(selection) => errors.push(cardinality_error(part, import, selection.found())),
                Err(e) => {
                    for error in e.into_composition_errors() {
                        errors.push(attribute(error, part, import));
                    }
                }
            }
        }

        if !errors.is_empty() {
            debug!(
                target: "mosaic::import",
                part = %part.display_name(),
                errors = errors.len(),
                "Import preview failed"
            );
            return errors.into_rejection();
        }

        let newly_tracked = {
            let mut state = self.state.lock();
            let manager = state.managers.entry(part.clone()).or_default();
            manager.state = ImportState::Previewed;
            manager.saved = saved;
            if state.tracked.contains(part) {
                false
            } else {
                state.tracked.push(part.clone());
                true
            }
        };
        if newly_tracked {
            let weak = self.me.clone();
            let part = part.clone();
            atomic.add_revert_action(move || {
                if let Some(engine) = weak.upgrade() {
                    engine.state.lock().tracked.retain(|p| *p != part);
                }
            });
        }

        debug!(
            target: "mosaic::import",
            part = %part.display_name(),
            imports = part.import_definitions().len(),
            "Imports previewed"
        );
        Ok(())
    }

    fn restore_on_revert(&self, atomic: &AtomicComposition<'_>, part: &PartRef, previous: Option<PartManager>) {
        let weak = self.me.clone();
        let part = part.clone();
        atomic.add_revert_action(move || {
            if let Some(engine) = weak.upgrade() {
                let mut state = engine.state.lock();
                match previous {
                    Some(manager) => {
                        state.managers.insert(part, manager);
                    }
                    None => {
                        state.managers.remove(&part);
                    }
                }
            }
        });
    }

    // ========================================================================
    // Satisfy
    // ========================================================================

    /// Set every import of `part` and watch it for recomposition
    ///
    /// # Errors
    ///
    /// Returns `Composition` if an import cannot be resolved or the part
    /// rejects it, `CompositionCycle` if the part's prerequisites depend on
    /// the part itself, or `DepthExceeded` past the configured nesting bound.
    pub fn satisfy_imports(&self, part: &PartRef) -> MosaicResult<()> {
        self.satisfy(part, true)
    }

    /// Set every import of `part` without watching it for recomposition
    pub fn satisfy_imports_once(&self, part: &PartRef) -> MosaicResult<()> {
        self.satisfy(part, false)
    }

    fn satisfy(&self, part: &PartRef, track: bool) -> MosaicResult<()> {
        let _depth = self.enter()?;

        let (start, mut saved) = {
            let mut state = self.state.lock();
            let manager = state.managers.entry(part.clone()).or_default();
            let current = manager.state;
            match current {
                ImportState::Composed | ImportState::PostExportSatisfying => return Ok(()),
                ImportState::Previewing | ImportState::PreExportSatisfying => {
                    return Err(MosaicError::CompositionCycle(format!(
                        "{} depends on itself through its prerequisite imports",
                        part.display_name()
                    )));
                }
                s => (s, std::mem::take(&mut manager.saved)),
            }
        };

        let result = self.satisfy_phases(part, start, &mut saved);
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                state.managers.entry(part.clone()).or_default().state = ImportState::Composed;
                if track && !part.import_definitions().is_empty() && !state.tracked.contains(part) {
                    state.tracked.push(part.clone());
                }
                drop(state);
                debug!(target: "mosaic::import", part = %part.display_name(), "Imports satisfied");
                Ok(())
            }
            Err(e) => {
                if let Some(manager) = state.managers.get_mut(part) {
                    manager.state = ImportState::NotSet;
                    manager.saved.clear();
                }
                Err(e)
            }
        }
    }

    fn satisfy_phases(
        &self,
        part: &PartRef,
        start: ImportState,
        saved: &mut FxHashMap<ImportDefinition, Vec<Export>>,
    ) -> MosaicResult<()> {
        if start != ImportState::PreExportSatisfied {
            self.set_state(part, ImportState::PreExportSatisfying);
            for import in part.import_definitions().iter().filter(|i| i.is_prerequisite()) {
                self.satisfy_import(part, import, saved.remove(import))?;
            }
            self.set_state(part, ImportState::PreExportSatisfied);
        }

        self.set_state(part, ImportState::PostExportSatisfying);
        for import in part.import_definitions().iter().filter(|i| !i.is_prerequisite()) {
            self.satisfy_import(part, import, saved.remove(import))?;
        }
        part.on_composed()
            .map_err(|e| MosaicError::composition(part_failure(part, None, e)))
    }

    fn satisfy_import(
        &self,
        part: &PartRef,
        import: &ImportDefinition,
        saved: Option<Vec<Export>>,
    ) -> MosaicResult<()> {
        let exports = match saved {
            Some(exports) => exports,
            None => match self.source()?.try_get_exports(import, None) {
                Ok(ExportSelection::Matched(exports)) => exports,
                Ok(selection) => {
                    return Err(MosaicError::composition(cardinality_error(
                        part,
                        import,
                        selection.found(),
                    )));
                }
                Err(e) => {
                    let errors: Vec<CompositionError> = e
                        .into_composition_errors()
                        .into_iter()
                        .map(|error| attribute(error, part, import))
                        .collect();
                    return Err(MosaicError::composition(errors));
                }
            },
        };
        part.set_import(import, &exports)
            .map_err(|e| MosaicError::composition(part_failure(part, Some(import), e)))
    }

    fn set_state(&self, part: &PartRef, new_state: ImportState) {
        self.state
            .lock()
            .managers
            .entry(part.clone())
            .or_default()
            .state = new_state;
    }

    fn enter(&self) -> MosaicResult<DepthGuard<'_>> {
        let thread = thread::current().id();
        let mut state = self.state.lock();
        let depth = state.depths.entry(thread).or_insert(0);
        if *depth >= self.options.max_composition_depth {
            return Err(MosaicError::DepthExceeded(self.options.max_composition_depth));
        }
        *depth += 1;
        Ok(DepthGuard {
            engine: self,
            thread,
        })
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// Forget `part`; restored if `atomic` is abandoned
    ///
    /// `on_released` runs when the outermost scope completes.
    pub fn release_imports(&self, part: &PartRef, atomic: &AtomicComposition<'_>) {
        let (manager, position) = {
            let mut state = self.state.lock();
            let manager = state.managers.remove(part);
            let position = state.tracked.iter().position(|p| p == part);
            if let Some(index) = position {
                state.tracked.remove(index);
            }
            (manager, position)
        };

        let weak = self.me.clone();
        let restored = part.clone();
        atomic.add_revert_action(move || {
            if let Some(engine) = weak.upgrade() {
                let mut state = engine.state.lock();
                if let Some(manager) = manager {
                    state.managers.insert(restored.clone(), manager);
                }
                if let Some(index) = position {
                    let index = index.min(state.tracked.len());
                    state.tracked.insert(index, restored);
                }
            }
        });

        let released = part.clone();
        atomic.add_complete_action(move || {
            released.on_released();
            Ok(())
        });
        debug!(target: "mosaic::import", part = %part.display_name(), "Imports released");
    }

    // ========================================================================
    // Recomposition
    // ========================================================================

    /// React to a pending change of the source's exports
    ///
    /// # Errors
    ///
    /// Returns `ChangeRejected` if the change would alter a non-recomposable
    /// import or break the cardinality of a recomposable one.
    pub fn on_exports_changing(&self, event: &ExportsChangeEvent<'_>) -> MosaicResult<()> {
        let atomic = match event.atomic {
            Some(atomic) if !event.is_empty() => atomic,
            _ => return Ok(()),
        };

        let tracked: Vec<(PartRef, ImportState)> = {
            let state = self.state.lock();
            state
                .tracked
                .iter()
                .filter_map(|p| state.managers.get(p).map(|m| (p.clone(), m.state)))
                .collect()
        };
        if tracked.is_empty() {
            return Ok(());
        }

        let source = self.source()?;
        let mut errors = CompositionErrors::new();
        for (part, part_state) in tracked {
            if matches!(part_state, ImportState::NotSet | ImportState::Previewing) {
                continue;
            }
            let affected: Vec<&ImportDefinition> = part
                .import_definitions()
                .iter()
                .filter(|i| event.changed_definitions().any(|d| i.is_constraint_satisfied_by(d)))
                .collect();
            if affected.is_empty() {
                continue;
            }

            let mut updates: Recomposition = Vec::new();
            let errors_before = errors.len();
            for import in affected {
                if !import.is_recomposable() {
                    errors.push(
                        CompositionError::new(
                            CompositionErrorKind::PreventedByExistingImport,
                            "change would alter the exports of an import that is not recomposable",
                        )
                        .with_part(part.display_name())
                        .with_import(import.to_string()),
                    );
                    continue;
                }
                match source.try_get_exports(import, Some(atomic)) {
                    Ok(ExportSelection::Matched(exports)) => updates.push((import.clone(), exports)),
                    Ok(selection) => errors.push(cardinality_error(&part, import, selection.found())),
                    Err(e) => {
                        for error in e.into_composition_errors() {
                            errors.push(attribute(error, &part, import));
                        }
                    }
                }
            }
            if errors.len() != errors_before {
                continue;
            }

            if part_state == ImportState::Previewed {
                self.replace_saved(&part, updates, atomic);
            } else {
                let weak = self.me.clone();
                atomic.add_complete_action(move || match weak.upgrade() {
                    Some(engine) => engine.recompose(&part, updates),
                    None => Ok(()),
                });
            }
        }

        if !errors.is_empty() {
            warn!(
                target: "mosaic::import",
                errors = errors.len(),
                "Change rejected by existing imports"
            );
        }
        errors.into_rejection()
    }

    fn replace_saved(&self, part: &PartRef, updates: Recomposition, atomic: &AtomicComposition<'_>) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.managers.get(part).cloned();
            if let Some(manager) = state.managers.get_mut(part) {
                for (import, exports) in updates {
                    manager.saved.insert(import, exports);
                }
            }
            previous
        };
        self.restore_on_revert(atomic, part, previous);
    }

    fn recompose(&self, part: &PartRef, updates: Recomposition) -> MosaicResult<()> {
        if !self.state.lock().managers.contains_key(part) {
            return Ok(());
        }
        for (import, exports) in &updates {
            part.set_import(import, exports)
                .map_err(|e| MosaicError::composition(part_failure(part, Some(import), e)))?;
        }
        part.on_composed()
            .map_err(|e| MosaicError::composition(part_failure(part, None, e)))?;
        self.metrics.record_recomposition();
        debug!(
            target: "mosaic::import",
            part = %part.display_name(),
            imports = updates.len(),
            "Imports recomposed"
        );
        Ok(())
    }
}

impl fmt::Debug for ImportEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ImportEngine")
            .field("parts", &state.managers.len())
            .field("tracked", &state.tracked.len())
            .finish()
    }
}

struct DepthGuard<'a> {
    engine: &'a ImportEngine,
    thread: ThreadId,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.engine.state.lock();
        if let Some(depth) = state.depths.get_mut(&self.thread) {
            *depth -= 1;
            if *depth == 0 {
                state.depths.remove(&self.thread);
            }
        }
    }
}

// ============================================================================
// Error construction
// ============================================================================

fn cardinality_error(part: &PartRef, import: &ImportDefinition, found: usize) -> CompositionError {
    let error = CompositionError::new(
        CompositionErrorKind::ImportCardinalityMismatch,
        format!(
            "expected {} export(s), found {}",
            import.cardinality(),
            found
        ),
    )
    .with_part(part.display_name())
    .with_import(import.to_string());
    match import.contract_name() {
        Some(contract) => error.with_contract(contract),
        None => error,
    }
}

fn part_failure(part: &PartRef, import: Option<&ImportDefinition>, error: PartError) -> CompositionError {
    let failure = CompositionError::new(CompositionErrorKind::PartFailure, error.message())
        .with_part(part.display_name());
    match import {
        Some(import) => failure.with_import(import.to_string()),
        None => failure,
    }
}

fn attribute(mut error: CompositionError, part: &PartRef, import: &ImportDefinition) -> CompositionError {
    if error.part.is_none() {
        error.part = Some(part.display_name());
    }
    if error.import.is_none() {
        error.import = Some(import.to_string());
    }
    error
}
