//! Part export provider
//!
//! Holds the live list of explicitly added parts and applies
//! [`CompositionBatch`]es to it atomically.
//!
//! # Compose pipeline
//!
//! 1. Compute the candidate list: the visible list (staged in the parent
//!    scope, else committed) minus removals, plus additions.
//! 2. Open an [`AtomicComposition`] and stage the candidate list in it, so
//!    queries made through the scope see the candidate graph.
//! 3. Release removed parts, raise "exports changing" (adapters and
//!    recomposition react here, and may veto), queue "exports changed".
//! 4. Preview the imports of every added part. Any failure rejects the batch
//!    and the scope's revert actions undo everything.
//! 5. Commit: swap in the new list and complete the scope.
//! 6. Satisfy the imports of every added part. Failures are aggregated and
//!    reported, but the committed list stays.
//!
//! A nested compose (`compose_in` with a parent scope) stages into the parent
//! instead of committing; its satisfy step runs when the outermost scope
//! completes.
//!
//! The live list is an `Arc<Vec<PartRef>>` that is only ever replaced, never
//! mutated, so readers always see a complete snapshot.

use crate::config::CompositionOptions;
use crate::events::{ChangeNotifier, ExportsChangeEvent};
use crate::import_engine::ImportEngine;
use crate::metrics::CompositionMetrics;
use crate::provider::ExportProvider;
use mosaic_concurrency::{AtomicComposition, CompositionLock, OwnerId, SnapshotCell};
use mosaic_core::{
    CompositionBatch, CompositionErrors, Export, ExportDefinition, ExportedValue,
    ImportDefinition, MosaicError, MosaicResult, PartRef,
};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

const PARTS_KEY: &str = "parts";

type PartList = Arc<Vec<PartRef>>;

/// Export provider over explicitly composed parts
pub struct PartExportProvider {
    me: Weak<PartExportProvider>,
    owner: OwnerId,
    parts: SnapshotCell<Vec<PartRef>>,
    composing: AtomicBool,
    disposed: AtomicBool,
    lock: CompositionLock,
    notifier: Arc<ChangeNotifier>,
    engine: OnceCell<Arc<ImportEngine>>,
    options: CompositionOptions,
    metrics: Arc<CompositionMetrics>,
}

impl PartExportProvider {
    /// Create an empty provider
    ///
    /// The provider cannot compose until [`set_source_provider`](Self::set_source_provider)
    /// has been called.
    pub fn new(options: CompositionOptions, metrics: Arc<CompositionMetrics>) -> Arc<Self> {
        Arc::new_cyclic(|me| PartExportProvider {
            me: me.clone(),
            owner: OwnerId::next(),
            parts: SnapshotCell::default(),
            composing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            lock: CompositionLock::new(options.thread_safe),
            notifier: Arc::new(ChangeNotifier::new()),
            engine: OnceCell::new(),
            options,
            metrics,
        })
    }

    /// Set the provider that imports of composed parts resolve against
    ///
    /// Usually the container's root provider, which includes this one.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` on a second call.
    pub fn set_source_provider(&self, source: &Arc<dyn ExportProvider>) -> MosaicResult<()> {
        self.ensure_not_disposed()?;
        if self.engine.get().is_some() {
            return Err(MosaicError::AlreadyInitialized(
                "PartExportProvider source provider".to_string(),
            ));
        }
        let engine = ImportEngine::new(source, self.options, Arc::clone(&self.metrics));
        self.engine.set(engine).map_err(|_| {
            MosaicError::AlreadyInitialized("PartExportProvider source provider".to_string())
        })
    }

    /// The import engine, once a source provider has been set
    pub fn import_engine(&self) -> MosaicResult<&Arc<ImportEngine>> {
        self.engine
            .get()
            .ok_or_else(|| MosaicError::NotInitialized("PartExportProvider source provider".to_string()))
    }

    /// Snapshot of the committed part list
    pub fn parts(&self) -> PartList {
        self.parts.load()
    }

    /// Options this provider was created with
    pub fn options(&self) -> &CompositionOptions {
        &self.options
    }

    /// Whether a compose call is running on this provider
    pub fn is_composing(&self) -> bool {
        self.composing.load(Ordering::Acquire)
    }

    /// Dispose the provider; repeated calls are no-ops
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!(target: "mosaic::compose", owner = %self.owner, "Part export provider disposed");
        }
    }

    fn ensure_not_disposed(&self) -> MosaicResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(MosaicError::Disposed("PartExportProvider"))
        } else {
            Ok(())
        }
    }

    fn visible_parts(&self, atomic: Option<&AtomicComposition<'_>>) -> PartList {
        atomic
            .and_then(|a| a.get_value::<PartList>(self.owner, PARTS_KEY))
            .unwrap_or_else(|| self.parts.load())
    }

    // ========================================================================
    // Compose
    // ========================================================================

    /// Apply a batch as one atomic change
    ///
    /// # Errors
    ///
    /// - `ReentrantCompose` if this provider is already composing
    /// - `ChangeRejected` if the batch cannot be previewed; nothing changed
    /// - `Composition` if the batch committed but some parts failed to satisfy
    pub fn compose(&self, batch: &CompositionBatch) -> MosaicResult<()> {
        self.compose_in(batch, None)
    }

    /// Apply a batch, nested inside `parent` when given
    ///
    /// A nested batch stages into `parent` and only becomes visible when the
    /// outermost scope completes.
    pub fn compose_in(
        &self,
        batch: &CompositionBatch,
        parent: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<()> {
        self.ensure_not_disposed()?;
        let engine = Arc::clone(self.import_engine()?);
        if batch.is_empty() {
            return Ok(());
        }

        let _lock = self.lock.lock_composition();
        let composing = match parent {
            None => Some(ComposingGuard::acquire(&self.composing)?),
            Some(_) => None,
        };

        let current = self.visible_parts(parent);
        let to_remove: Vec<PartRef> = batch
            .parts_to_remove()
            .iter()
            .filter(|p| current.contains(p))
            .cloned()
            .collect();
        let mut candidate: Vec<PartRef> = current
            .iter()
            .filter(|p| !to_remove.contains(p))
            .cloned()
            .collect();
        let to_add: Vec<PartRef> = batch
            .parts_to_add()
            .iter()
            .filter(|p| !candidate.contains(p))
            .cloned()
            .collect();
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(());
        }
        candidate.extend(to_add.iter().cloned());
        let candidate: PartList = Arc::new(candidate);

        self.metrics.record_start();
        debug!(
            target: "mosaic::compose",
            added = to_add.len(),
            removed = to_remove.len(),
            nested = parent.is_some(),
            "Composing batch"
        );

        let atomic = AtomicComposition::new(parent);
        atomic.set_value(self.owner, PARTS_KEY, Arc::clone(&candidate));
        if parent.is_some() && !self.is_composing() {
            let weak = self.me.clone();
            let staged = Arc::clone(&candidate);
            atomic.add_complete_action(move || {
                if let Some(provider) = weak.upgrade() {
                    provider.parts.store(staged);
                }
                Ok(())
            });
        }

        if let Err(e) = self.recompose_and_preview(&engine, &to_add, &to_remove, &atomic) {
            self.metrics.record_reject();
            let e = if e.is_rejection() {
                e
            } else {
                MosaicError::rejected(e.into_composition_errors())
            };
            warn!(target: "mosaic::compose", error = %e, "Batch rejected");
            return Err(e);
        }

        if parent.is_some() {
            let metrics = Arc::clone(&self.metrics);
            atomic.add_complete_action(move || {
                metrics.record_commit();
                satisfy_all(&engine, &to_add, &metrics)
            });
            atomic.complete()?;
            debug!(target: "mosaic::compose", "Nested batch staged in parent composition");
            return Ok(());
        }

        let mut errors = CompositionErrors::new();
        let latest = atomic
            .get_value::<PartList>(self.owner, PARTS_KEY)
            .unwrap_or(candidate);
        let part_count = latest.len();
        self.parts.store(latest);
        // Queued actions satisfy parts of nested batches, which may compose
        drop(composing);
        if let Err(e) = atomic.complete() {
            errors.merge(e);
        }
        self.metrics.record_commit();
        info!(target: "mosaic::compose", parts = part_count, "Batch committed");

        if let Err(e) = satisfy_all(&engine, &to_add, &self.metrics) {
            errors.merge(e);
        }
        if !errors.is_empty() {
            warn!(
                target: "mosaic::compose",
                errors = errors.len(),
                "Batch committed with composition errors"
            );
        }
        errors.into_composition()
    }

    fn recompose_and_preview(
        &self,
        engine: &ImportEngine,
        to_add: &[PartRef],
        to_remove: &[PartRef],
        atomic: &AtomicComposition<'_>,
    ) -> MosaicResult<()> {
        for part in to_remove {
            engine.release_imports(part, atomic);
        }

        let added = export_definitions_of(to_add);
        let removed = export_definitions_of(to_remove);
        if !added.is_empty() || !removed.is_empty() {
            let event = ExportsChangeEvent::changing(added.clone(), removed.clone(), atomic);
            self.notifier.raise_changing(&event)?;
            let notifier = Arc::clone(&self.notifier);
            atomic.add_complete_action(move || {
                notifier.raise_changed(&ExportsChangeEvent::changed(added, removed))
            });
        }

        let mut errors = CompositionErrors::new();
        for part in to_add {
            if let Err(e) = engine.preview_imports(part, atomic) {
                errors.merge(e);
            }
        }
        errors.into_rejection()
    }

    // ========================================================================
    // Values
    // ========================================================================

    fn create_export(&self, part: &PartRef, definition: &ExportDefinition) -> Export {
        let weak = self.me.clone();
        let part = part.clone();
        let declared = definition.clone();
        Export::new(definition.clone(), move || match weak.upgrade() {
            Some(provider) => provider.produce_value(&part, &declared),
            None => Err(MosaicError::Disposed("PartExportProvider")),
        })
    }

    fn produce_value(&self, part: &PartRef, definition: &ExportDefinition) -> MosaicResult<ExportedValue> {
        self.ensure_not_disposed()?;
        if !part.import_definitions().is_empty() {
            self.import_engine()?.satisfy_imports(part)?;
        }
        Ok(part.get_exported_value(definition)?)
    }
}

impl ExportProvider for PartExportProvider {
    fn get_exports_core(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        self.ensure_not_disposed()?;
        let parts = self.visible_parts(atomic);
        let mut exports = Vec::new();
        for part in parts.iter() {
            for definition in part.export_definitions() {
                if import.is_constraint_satisfied_by(definition) {
                    exports.push(self.create_export(part, definition));
                }
            }
        }
        Ok(exports)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl fmt::Debug for PartExportProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartExportProvider")
            .field("owner", &self.owner)
            .field("parts", &self.parts.load().len())
            .field("composing", &self.is_composing())
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Clears the composing flag when the outermost frame ends
struct ComposingGuard<'a>(&'a AtomicBool);

impl<'a> ComposingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> MosaicResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| MosaicError::ReentrantCompose)?;
        Ok(ComposingGuard(flag))
    }
}

impl Drop for ComposingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn export_definitions_of(parts: &[PartRef]) -> Vec<ExportDefinition> {
    parts
        .iter()
        .flat_map(|p| p.export_definitions().iter().cloned())
        .collect()
}

fn satisfy_all(engine: &ImportEngine, parts: &[PartRef], metrics: &CompositionMetrics) -> MosaicResult<()> {
    let mut errors = CompositionErrors::new();
    for part in parts {
        if let Err(e) = engine.satisfy_imports(part) {
            metrics.record_satisfy_failure();
            warn!(
                target: "mosaic::compose",
                part = %part.display_name(),
                error = %e,
                "Failed to satisfy imports after commit"
            );
            errors.merge(e);
        }
    }
    errors.into_composition()
}
