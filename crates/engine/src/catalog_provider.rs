//! Catalog export provider
//!
//! Exposes the exports of a read-only [`Catalog`]. Nothing is instantiated
//! while exports are enumerated: the first value request against a part
//! definition creates its single shared instance, satisfies the instance's
//! imports through this provider's import engine, and then produces the
//! value.

use crate::config::CompositionOptions;
use crate::events::ChangeNotifier;
use crate::import_engine::ImportEngine;
use crate::metrics::CompositionMetrics;
use crate::provider::ExportProvider;
use mosaic_concurrency::AtomicComposition;
use mosaic_core::{
    Catalog, ComposablePartDefinition, Export, ExportedValue, ImportDefinition, MosaicError,
    MosaicResult, PartError, PartRef,
};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

struct CatalogEntry {
    definition: Arc<dyn ComposablePartDefinition>,
    instance: OnceCell<PartRef>,
}

/// Export provider over a catalog of part definitions
pub struct CatalogExportProvider {
    me: Weak<CatalogExportProvider>,
    entries: Vec<CatalogEntry>,
    engine: OnceCell<Arc<ImportEngine>>,
    notifier: ChangeNotifier,
    options: CompositionOptions,
    metrics: Arc<CompositionMetrics>,
    disposed: AtomicBool,
}

impl CatalogExportProvider {
    /// Snapshot `catalog`'s definitions into a new provider
    pub fn new(
        catalog: &dyn Catalog,
        options: CompositionOptions,
        metrics: Arc<CompositionMetrics>,
    ) -> Arc<Self> {
        let entries = catalog
            .parts()
            .into_iter()
            .map(|definition| CatalogEntry {
                definition,
                instance: OnceCell::new(),
            })
            .collect();
        Arc::new_cyclic(|me| CatalogExportProvider {
            me: me.clone(),
            entries,
            engine: OnceCell::new(),
            notifier: ChangeNotifier::new(),
            options,
            metrics,
            disposed: AtomicBool::new(false),
        })
    }

    /// Set the provider that created parts' imports resolve against
    pub fn set_source_provider(&self, source: &Arc<dyn ExportProvider>) -> MosaicResult<()> {
        if self.engine.get().is_some() {
            return Err(MosaicError::AlreadyInitialized(
                "CatalogExportProvider source provider".to_string(),
            ));
        }
        let engine = ImportEngine::new(source, self.options, Arc::clone(&self.metrics));
        self.engine.set(engine).map_err(|_| {
            MosaicError::AlreadyInitialized("CatalogExportProvider source provider".to_string())
        })
    }

    /// Number of part definitions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog had no part definitions
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instances created so far
    pub fn created_parts(&self) -> Vec<PartRef> {
        self.entries
            .iter()
            .filter_map(|entry| entry.instance.get().cloned())
            .collect()
    }

    /// Dispose the provider; repeated calls are no-ops
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            debug!(target: "mosaic::compose", "Catalog export provider disposed");
        }
    }

    fn ensure_not_disposed(&self) -> MosaicResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(MosaicError::Disposed("CatalogExportProvider"))
        } else {
            Ok(())
        }
    }

    fn produce_value(&self, entry: usize, export: usize) -> MosaicResult<ExportedValue> {
        self.ensure_not_disposed()?;
        let engine = self.engine.get().ok_or_else(|| {
            MosaicError::NotInitialized("CatalogExportProvider source provider".to_string())
        })?;
        let entry = self
            .entries
            .get(entry)
            .ok_or_else(|| PartError::new("catalog entry out of range"))?;

        // Created inside the cell, satisfied outside it: satisfying may come
        // back here for another export of the same part.
        let part = entry
            .instance
            .get_or_try_init(|| {
                let part = entry.definition.create_part()?;
                debug!(
                    target: "mosaic::compose",
                    part = %part.display_name(),
                    "Catalog part created"
                );
                Ok::<_, MosaicError>(part)
            })?
            .clone();
        if !part.import_definitions().is_empty() {
            engine.satisfy_imports(&part)?;
        }

        let definition = part.export_definitions().get(export).cloned().ok_or_else(|| {
            PartError::new(format!(
                "{} has no export at position {}",
                part.display_name(),
                export
            ))
        })?;
        Ok(part.get_exported_value(&definition)?)
    }
}

impl ExportProvider for CatalogExportProvider {
    fn get_exports_core(
        &self,
        import: &ImportDefinition,
        _atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        self.ensure_not_disposed()?;
        let mut exports = Vec::new();
        for (entry_index, entry) in self.entries.iter().enumerate() {
            for (export_index, definition) in entry.definition.export_definitions().iter().enumerate() {
                if !import.is_constraint_satisfied_by(definition) {
                    continue;
                }
                let weak = self.me.clone();
                exports.push(Export::new(definition.clone(), move || match weak.upgrade() {
                    Some(provider) => provider.produce_value(entry_index, export_index),
                    None => Err(MosaicError::Disposed("CatalogExportProvider")),
                }));
            }
        }
        Ok(exports)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl fmt::Debug for CatalogExportProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogExportProvider")
            .field("definitions", &self.entries.len())
            .field("created", &self.created_parts().len())
            .finish()
    }
}
