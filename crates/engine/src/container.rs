//! Composition container
//!
//! The container wires the providers together and is the main entry point:
//!
//! ```text
//! PartExportProvider ─┐
//!                     ├─ AggregateExportProvider ─ AdaptingExportProvider = root
//! CatalogExportProvider (optional)
//! ```
//!
//! With `adaptation` off the aggregate is the root. Every import engine
//! resolves against the root, so adapted exports can satisfy imports.

use crate::adapting::AdaptingExportProvider;
use crate::aggregate::AggregateExportProvider;
use crate::catalog_provider::CatalogExportProvider;
use crate::config::CompositionOptions;
use crate::events::ChangeNotifier;
use crate::metrics::{CompositionMetrics, MetricsSnapshot};
use crate::part_provider::PartExportProvider;
use crate::provider::ExportProvider;
use mosaic_concurrency::AtomicComposition;
use mosaic_core::{
    Catalog, CompositionBatch, Export, ImportDefinition, MosaicError, MosaicResult, PartRef,
};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Composition container
///
/// # Example
///
/// ```
/// use mosaic_core::CompositionBatch;
/// use mosaic_engine::{CompositionContainer, ExportProviderExt};
///
/// let container = CompositionContainer::new()?;
/// let mut batch = CompositionBatch::new();
/// batch.add_exported_value("Greeting", String::from("hello"));
/// container.compose(&batch)?;
///
/// let greeting = container.get_exported_value::<String>("Greeting")?;
/// assert_eq!(greeting.as_str(), "hello");
/// # Ok::<(), mosaic_core::MosaicError>(())
/// ```
pub struct CompositionContainer {
    options: CompositionOptions,
    metrics: Arc<CompositionMetrics>,
    parts: Arc<PartExportProvider>,
    catalog: Option<Arc<CatalogExportProvider>>,
    root: Arc<dyn ExportProvider>,
    disposed: AtomicBool,
}

impl CompositionContainer {
    /// Container with default options and no catalog
    pub fn new() -> MosaicResult<Self> {
        Self::build(CompositionOptions::default(), None)
    }

    /// Container with explicit options
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the options do not validate.
    pub fn with_options(options: CompositionOptions) -> MosaicResult<Self> {
        Self::build(options, None)
    }

    /// Container whose exports include a catalog's
    pub fn with_catalog(catalog: &dyn Catalog, options: CompositionOptions) -> MosaicResult<Self> {
        Self::build(options, Some(catalog))
    }

    /// Container configured from a `mosaic.toml` file
    pub fn from_config_file(path: &Path) -> MosaicResult<Self> {
        Self::build(CompositionOptions::from_file(path)?, None)
    }

    fn build(options: CompositionOptions, catalog: Option<&dyn Catalog>) -> MosaicResult<Self> {
        options.validate()?;
        let metrics = Arc::new(CompositionMetrics::new());

        let parts = PartExportProvider::new(options, Arc::clone(&metrics));
        let catalog = catalog.map(|c| CatalogExportProvider::new(c, options, Arc::clone(&metrics)));

        let mut children: Vec<Arc<dyn ExportProvider>> = Vec::new();
        children.push(parts.clone());
        if let Some(catalog) = &catalog {
            children.push(catalog.clone());
        }
        let aggregate: Arc<dyn ExportProvider> = AggregateExportProvider::new(children);

        let root: Arc<dyn ExportProvider> = if options.adaptation {
            let adapting = AdaptingExportProvider::new();
            adapting.set_source_provider(aggregate)?;
            adapting as Arc<dyn ExportProvider>
        } else {
            aggregate
        };

        parts.set_source_provider(&root)?;
        if let Some(catalog) = &catalog {
            catalog.set_source_provider(&root)?;
        }

        info!(
            target: "mosaic::compose",
            thread_safe = options.thread_safe,
            adaptation = options.adaptation,
            catalog = catalog.as_ref().map_or(0, |c| c.len()),
            "Composition container created"
        );

        Ok(CompositionContainer {
            options,
            metrics,
            parts,
            catalog,
            root,
            disposed: AtomicBool::new(false),
        })
    }

    fn ensure_not_disposed(&self) -> MosaicResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(MosaicError::Disposed("CompositionContainer"))
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Composition
    // ========================================================================

    /// Apply a batch atomically
    ///
    /// # Errors
    ///
    /// `ChangeRejected` leaves the container exactly as it was;
    /// `Composition` means the batch committed but some imports failed.
    pub fn compose(&self, batch: &CompositionBatch) -> MosaicResult<()> {
        self.ensure_not_disposed()?;
        self.parts.compose(batch)
    }

    /// Apply a batch inside an enclosing composition
    pub fn compose_in(
        &self,
        batch: &CompositionBatch,
        parent: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<()> {
        self.ensure_not_disposed()?;
        self.parts.compose_in(batch, parent)
    }

    /// Add parts in one batch
    pub fn compose_parts<I>(&self, parts: I) -> MosaicResult<()>
    where
        I: IntoIterator<Item = PartRef>,
    {
        let mut batch = CompositionBatch::new();
        for part in parts {
            batch.add_part(part);
        }
        self.compose(&batch)
    }

    /// Satisfy a part's imports without adding it or tracking it
    ///
    /// The part is not recomposed when exports change later.
    pub fn satisfy_imports_once(&self, part: &PartRef) -> MosaicResult<()> {
        self.ensure_not_disposed()?;
        self.parts.import_engine()?.satisfy_imports_once(part)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Snapshot of the explicitly composed parts
    pub fn parts(&self) -> Arc<Vec<PartRef>> {
        self.parts.parts()
    }

    /// Instances the catalog has created so far
    pub fn catalog_parts(&self) -> Vec<PartRef> {
        self.catalog
            .as_ref()
            .map(|c| c.created_parts())
            .unwrap_or_default()
    }

    /// Composition counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Options the container was built with
    pub fn options(&self) -> &CompositionOptions {
        &self.options
    }

    /// The provider imports resolve against
    pub fn root(&self) -> &Arc<dyn ExportProvider> {
        &self.root
    }

    /// Dispose the container and its providers; repeated calls are no-ops
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.parts.dispose();
        if let Some(catalog) = &self.catalog {
            catalog.dispose();
        }
        info!(target: "mosaic::compose", "Composition container disposed");
    }

    /// Whether `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl ExportProvider for CompositionContainer {
    fn get_exports_core(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        self.ensure_not_disposed()?;
        self.root.get_exports_core(import, atomic)
    }

    fn notifier(&self) -> &ChangeNotifier {
        self.root.notifier()
    }
}

impl fmt::Debug for CompositionContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionContainer")
            .field("options", &self.options)
            .field("parts", &self.parts.parts().len())
            .field("catalog", &self.catalog.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
