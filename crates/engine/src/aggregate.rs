//! Aggregate export provider
//!
//! Concatenates the exports of its children in order and forwards their
//! change notifications.

use crate::events::ChangeNotifier;
use crate::provider::ExportProvider;
use mosaic_concurrency::AtomicComposition;
use mosaic_core::{Export, ImportDefinition, MosaicResult};
use std::fmt;
use std::sync::{Arc, Weak};

/// Provider over an ordered list of child providers
pub struct AggregateExportProvider {
    providers: Vec<Arc<dyn ExportProvider>>,
    notifier: ChangeNotifier,
}

impl AggregateExportProvider {
    /// Create an aggregate and subscribe to every child
    pub fn new(providers: Vec<Arc<dyn ExportProvider>>) -> Arc<Self> {
        let aggregate = Arc::new(AggregateExportProvider {
            providers,
            notifier: ChangeNotifier::new(),
        });

        for provider in &aggregate.providers {
            let weak: Weak<AggregateExportProvider> = Arc::downgrade(&aggregate);
            provider.notifier().on_changing(move |event| match weak.upgrade() {
                Some(aggregate) => aggregate.notifier.raise_changing(event),
                None => Ok(()),
            });
            let weak: Weak<AggregateExportProvider> = Arc::downgrade(&aggregate);
            provider.notifier().on_changed(move |event| match weak.upgrade() {
                Some(aggregate) => aggregate.notifier.raise_changed(event),
                None => Ok(()),
            });
        }
        aggregate
    }

    /// Child providers in query order
    pub fn providers(&self) -> &[Arc<dyn ExportProvider>] {
        &self.providers
    }
}

impl ExportProvider for AggregateExportProvider {
    fn get_exports_core(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        let mut exports = Vec::new();
        for provider in &self.providers {
            exports.extend(provider.get_exports_core(import, atomic)?);
        }
        Ok(exports)
    }

    fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

impl fmt::Debug for AggregateExportProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateExportProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}
