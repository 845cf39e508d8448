//! Contract adaptation
//!
//! An adapter is an ordinary export of contract [`ADAPTER_CONTRACT`] whose
//! metadata names a `FromContract` and a `ToContract` and whose value is an
//! [`AdapterFunction`]. The [`AdaptingExportProvider`] sits in front of a
//! source provider and answers queries for a `ToContract` with the source's
//! own exports followed by every source export of the `FromContract` run
//! through the adapter.
//!
//! Adapters only ever see source exports, so they never chain.

use crate::events::{ChangeNotifier, ExportsChangeEvent};
use crate::provider::ExportProvider;
use mosaic_concurrency::AtomicComposition;
use mosaic_core::{
    metadata_from, metadata_str, Cardinality, CompositionError, CompositionErrorKind,
    CompositionErrors, Export, ExportDefinition, ImportDefinition, Metadata, MosaicError,
    MosaicResult, PartError,
};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Contract name adapters are exported under
pub const ADAPTER_CONTRACT: &str = "mosaic.adapter";

/// Metadata key naming the contract an adapter consumes
pub const FROM_CONTRACT_KEY: &str = "FromContract";

/// Metadata key naming the contract an adapter produces
pub const TO_CONTRACT_KEY: &str = "ToContract";

type AdaptFn = dyn Fn(&Export) -> Result<Option<Export>, PartError> + Send + Sync;

/// Value of an adapter export
///
/// Returning `Ok(None)` skips the source export.
#[derive(Clone)]
pub struct AdapterFunction(Arc<AdaptFn>);

impl AdapterFunction {
    /// Wrap an adapting closure
    pub fn new<F>(adapt: F) -> Self
    where
        F: Fn(&Export) -> Result<Option<Export>, PartError> + Send + Sync + 'static,
    {
        AdapterFunction(Arc::new(adapt))
    }

    /// Adapter that re-exports every source export under `to_contract`
    ///
    /// The source's metadata is kept and its value is forwarded lazily.
    pub fn forwarding(to_contract: impl Into<String>) -> Self {
        let to_contract = to_contract.into();
        Self::new(move |export| {
            let definition = ExportDefinition::with_metadata(
                to_contract.clone(),
                export.definition().metadata().clone(),
            );
            Ok(Some(Export::forwarding(definition, export)))
        })
    }

    /// Run the adapter on one export
    pub fn adapt(&self, export: &Export) -> Result<Option<Export>, PartError> {
        (self.0)(export)
    }
}

impl fmt::Debug for AdapterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdapterFunction")
    }
}

/// Metadata marking an export as an adapter from `from` to `to`
pub fn adapter_metadata(from: &str, to: &str) -> Metadata {
    metadata_from([(FROM_CONTRACT_KEY, from), (TO_CONTRACT_KEY, to)])
}

/// Build an adapter export
///
/// ```
/// use mosaic_core::CompositionBatch;
/// use mosaic_engine::adapting::{adapter_export, AdapterFunction};
///
/// let mut batch = CompositionBatch::new();
/// batch.add_export(adapter_export("Old", "New", AdapterFunction::forwarding("New")));
/// ```
pub fn adapter_export(from: &str, to: &str, function: AdapterFunction) -> Export {
    Export::from_value(
        ExportDefinition::with_metadata(ADAPTER_CONTRACT, adapter_metadata(from, to)),
        Arc::new(function),
    )
}

/// A validated adapter export
#[derive(Clone)]
struct Adapter {
    definition: ExportDefinition,
    from: String,
    to: String,
    function: AdapterFunction,
}

impl Adapter {
    fn from_export(export: &Export) -> Result<Adapter, CompositionError> {
        let definition = export.definition();
        let metadata = definition.metadata();
        let invalid = |message: String| {
            CompositionError::new(CompositionErrorKind::InvalidAdapter, message)
                .with_contract(ADAPTER_CONTRACT)
        };

        let from = match metadata_str(metadata, FROM_CONTRACT_KEY) {
            Some(from) if !from.is_empty() => from.to_string(),
            _ => return Err(invalid(format!("adapter has no string '{FROM_CONTRACT_KEY}' metadata"))),
        };
        let to = match metadata_str(metadata, TO_CONTRACT_KEY) {
            Some(to) if !to.is_empty() => to.to_string(),
            _ => return Err(invalid(format!("adapter has no string '{TO_CONTRACT_KEY}' metadata"))),
        };
        if from == to {
            return Err(invalid(format!("adapter maps contract '{from}' onto itself")));
        }
        if to == ADAPTER_CONTRACT {
            return Err(invalid("adapter cannot produce adapters".to_string()));
        }

        let function = match export.value_as::<AdapterFunction>() {
            Ok(function) => function.as_ref().clone(),
            Err(MosaicError::TypeMismatch { .. }) => {
                return Err(invalid(format!(
                    "adapter from '{from}' to '{to}' does not export an AdapterFunction"
                )));
            }
            Err(e) => return Err(invalid(format!("adapter from '{from}' to '{to}' failed: {e}"))),
        };

        Ok(Adapter {
            definition: definition.clone(),
            from,
            to,
            function,
        })
    }

    /// Adapt every source export of the From contract
    fn adapt_all(
        &self,
        source: &dyn ExportProvider,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        let import = ImportDefinition::contract(self.from.as_str(), Cardinality::ZeroOrMore);
        let mut adapted = Vec::new();
        for export in source.get_exports_core(&import, atomic)? {
            let result = self
                .function
                .adapt(&export)
                .map_err(|e| MosaicError::adapter(self.to.as_str(), e.message()))?;
            let Some(result) = result else { continue };
            if result.contract_name() != self.to {
                return Err(MosaicError::adapter(
                    self.to.as_str(),
                    format!("adapter returned an export of contract '{}'", result.contract_name()),
                ));
            }
            adapted.push(result);
        }
        Ok(adapted)
    }
}

/// Provider adding adapted exports to a source provider's exports
pub struct AdaptingExportProvider {
    me: Weak<AdaptingExportProvider>,
    source: OnceCell<Arc<dyn ExportProvider>>,
    notifier: ChangeNotifier,
}

impl AdaptingExportProvider {
    /// Create a provider with no source yet
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| AdaptingExportProvider {
            me: me.clone(),
            source: OnceCell::new(),
            notifier: ChangeNotifier::new(),
        })
    }

    /// Set the provider whose exports (and adapters) are adapted
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` on a second call.
    pub fn set_source_provider(&self, source: Arc<dyn ExportProvider>) -> MosaicResult<()> {
        if self.source.get().is_some() {
            return Err(MosaicError::AlreadyInitialized(
                "AdaptingExportProvider source provider".to_string(),
            ));
        }
        let weak = self.me.clone();
        source.notifier().on_changing(move |event| match weak.upgrade() {
            Some(provider) => provider.on_source_changing(event),
            None => Ok(()),
        });
        self.source.set(source).map_err(|_| {
            MosaicError::AlreadyInitialized("AdaptingExportProvider source provider".to_string())
        })
    }

    fn source(&self) -> MosaicResult<&Arc<dyn ExportProvider>> {
        self.source.get().ok_or_else(|| {
            MosaicError::NotInitialized("AdaptingExportProvider source provider".to_string())
        })
    }

    /// Every adapter visible in `atomic`, validated
    ///
    /// With `target` set, adapters whose `ToContract` metadata cannot match
    /// it are skipped before their value is forced.
    fn adapters(
        source: &dyn ExportProvider,
        atomic: Option<&AtomicComposition<'_>>,
        target: Option<&ImportDefinition>,
    ) -> MosaicResult<Vec<Adapter>> {
        let import = ImportDefinition::contract(ADAPTER_CONTRACT, Cardinality::ZeroOrMore);
        let mut adapters = Vec::new();
        let mut errors = CompositionErrors::new();
        for export in source.get_exports_core(&import, atomic)? {
            if let Some(target) = target {
                let to = metadata_str(export.definition().metadata(), TO_CONTRACT_KEY);
                if !to.map_or(false, |to| target.may_match_contract(to)) {
                    continue;
                }
            }
            match Adapter::from_export(&export) {
                Ok(adapter) => adapters.push(adapter),
                Err(error) => {
                    warn!(target: "mosaic::adapt", error = %error, "Invalid adapter");
                    errors.push(error);
                }
            }
        }
        errors.into_composition()?;
        Ok(adapters)
    }

    // ========================================================================
    // Change propagation
    // ========================================================================

    fn on_source_changing(&self, event: &ExportsChangeEvent<'_>) -> MosaicResult<()> {
        match event.atomic {
            Some(atomic) => self.propagate_changing(event, atomic),
            None => {
                let local = AtomicComposition::new(None);
                self.propagate_changing(event, &local)?;
                local.complete()
            }
        }
    }

    /// Re-raise a source change with the adapted exports it adds and removes
    fn propagate_changing(
        &self,
        event: &ExportsChangeEvent<'_>,
        atomic: &AtomicComposition<'_>,
    ) -> MosaicResult<()> {
        let (added, removed) = self.adapted_changes(event, atomic).map_err(|e| {
            if e.is_rejection() {
                e
            } else {
                MosaicError::rejected(e.into_composition_errors())
            }
        })?;

        let mut all_added = event.added.clone();
        all_added.extend(added);
        let mut all_removed = event.removed.clone();
        all_removed.extend(removed);

        let changing = ExportsChangeEvent::changing(all_added.clone(), all_removed.clone(), atomic);
        self.notifier.raise_changing(&changing)?;

        let weak = self.me.clone();
        atomic.add_complete_action(move || match weak.upgrade() {
            Some(provider) => provider
                .notifier
                .raise_changed(&ExportsChangeEvent::changed(all_added, all_removed)),
            None => Ok(()),
        });
        Ok(())
    }

    /// Whether `adapter` changes its target's exports: it is missing from
    /// the other side of the change, or its From contract changed
    fn affects(adapter: &Adapter, others: &[Adapter], event: &ExportsChangeEvent<'_>) -> bool {
        let toggled = !others.iter().any(|a| a.definition.same_as(&adapter.definition));
        toggled
            || event
                .changed_definitions()
                .any(|d| d.contract_name() == adapter.from)
    }

    /// Adapted definitions that appear and disappear with this change
    fn adapted_changes(
        &self,
        event: &ExportsChangeEvent<'_>,
        atomic: &AtomicComposition<'_>,
    ) -> MosaicResult<(Vec<ExportDefinition>, Vec<ExportDefinition>)> {
        let source = self.source()?.as_ref();
        // A nested scope changes the view of its parent, not the committed one
        let previous = atomic.parent();
        let before = Self::adapters(source, previous, None)?;
        let after = Self::adapters(source, Some(atomic), None)?;

        let mut affected: Vec<&str> = Vec::new();
        for adapter in &before {
            if Self::affects(adapter, &after, event) && !affected.contains(&adapter.to.as_str()) {
                affected.push(&adapter.to);
            }
        }
        for adapter in &after {
            if Self::affects(adapter, &before, event) && !affected.contains(&adapter.to.as_str()) {
                affected.push(&adapter.to);
            }
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        for contract in affected {
            for adapter in before.iter().filter(|a| a.to == contract) {
                removed.extend(
                    adapter
                        .adapt_all(source, previous)?
                        .iter()
                        .map(|e| e.definition().clone()),
                );
            }
            for adapter in after.iter().filter(|a| a.to == contract) {
                added.extend(
                    adapter
                        .adapt_all(source, Some(atomic))?
                        .iter()
                        .map(|e| e.definition().clone()),
                );
            }
        }

        debug!(
            target: "mosaic::adapt",
            adapters = after.len(),
            added = added.len(),
            removed = removed.len(),
            "Adapted exports changing"
        );
        Ok((added, removed))
    }
}

impl ExportProvider for AdaptingExportProvider {
    fn get_exports_core(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        let source = self.source()?.as_ref();
        let mut exports = source.get_exports_core(import, atomic)?;
        for adapter in &Self::adapters(source, atomic, Some(import))? {
            exports.extend(
                adapter
                    .adapt_all(source, atomic)?
                    .into_iter()
                    .filter(|e| import.is_constraint_satisfied_by(e.definition())),
            );
        }
        Ok(exports)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl fmt::Debug for AdaptingExportProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptingExportProvider")
            .field("initialized", &self.source.get().is_some())
            .field("notifier", &self.notifier)
            .finish()
    }
}
