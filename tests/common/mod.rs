//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use mosaic::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once, Weak};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// Container with default options.
pub fn container() -> Arc<CompositionContainer> {
    init_tracing();
    Arc::new(CompositionContainer::new().expect("container"))
}

/// Container with `contract` already exporting each of `values`.
pub fn container_with<T>(contract: &str, values: Vec<T>) -> Arc<CompositionContainer>
where
    T: Send + Sync + 'static,
{
    let container = container();
    let mut batch = CompositionBatch::new();
    for value in values {
        batch.add_exported_value(contract, value);
    }
    container.compose(&batch).expect("initial compose");
    container
}

// ============================================================================
// Importer - records what it was injected with
// ============================================================================

/// Part with a single contract import that records every injection.
pub struct Importer {
    imports: Vec<ImportDefinition>,
    satisfied: AtomicUsize,
    values: Mutex<Vec<ExportedValue>>,
    released: AtomicBool,
}

impl Importer {
    pub fn new(contract: &str, cardinality: Cardinality, recomposable: bool) -> Arc<Self> {
        Arc::new(Importer {
            imports: vec![ImportDefinition::contract(contract, cardinality).recomposable(recomposable)],
            satisfied: AtomicUsize::new(0),
            values: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        })
    }

    /// Recomposable `ZeroOrMore` importer.
    pub fn many(contract: &str) -> Arc<Self> {
        Self::new(contract, Cardinality::ZeroOrMore, true)
    }

    pub fn part(self: &Arc<Self>) -> PartRef {
        PartRef::from_arc(Arc::clone(self))
    }

    /// How many times `set_import` was called.
    pub fn satisfied_count(&self) -> usize {
        self.satisfied.load(Ordering::SeqCst)
    }

    /// Values from the latest injection.
    pub fn values<T: Clone + Send + Sync + 'static>(&self) -> Vec<T> {
        self.values
            .lock()
            .iter()
            .map(|v| v.downcast_ref::<T>().cloned().expect("value of the expected type"))
            .collect()
    }

    /// The single value from the latest injection, if exactly one.
    pub fn value<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let values = self.values::<T>();
        match values.len() {
            1 => values.into_iter().next(),
            _ => None,
        }
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl ComposablePart for Importer {
    fn export_definitions(&self) -> &[ExportDefinition] {
        &[]
    }

    fn import_definitions(&self) -> &[ImportDefinition] {
        &self.imports
    }

    fn get_exported_value(&self, _: &ExportDefinition) -> Result<ExportedValue, PartError> {
        Err(PartError::new("importer has no exports"))
    }

    fn set_import(&self, _: &ImportDefinition, exports: &[Export]) -> Result<(), PartError> {
        self.satisfied.fetch_add(1, Ordering::SeqCst);
        let values = exports
            .iter()
            .map(Export::value)
            .collect::<MosaicResult<Vec<_>>>()
            .map_err(|e| PartError::new(e.to_string()))?;
        *self.values.lock() = values;
        Ok(())
    }

    fn on_released(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// CallbackPart - runs code while its imports are being set
// ============================================================================

/// Contract the callback part imports; nothing exports it.
pub const CALLBACK_TRIGGER: &str = "CallbackTrigger";

/// Part that runs a callback once, the first time its import is set.
pub struct CallbackPart {
    imports: Vec<ImportDefinition>,
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CallbackPart {
    pub fn new<F: FnOnce() + Send + 'static>(callback: F) -> PartRef {
        PartRef::new(CallbackPart {
            imports: vec![ImportDefinition::contract(CALLBACK_TRIGGER, Cardinality::ZeroOrMore)],
            callback: Mutex::new(Some(Box::new(callback))),
        })
    }
}

impl ComposablePart for CallbackPart {
    fn export_definitions(&self) -> &[ExportDefinition] {
        &[]
    }

    fn import_definitions(&self) -> &[ImportDefinition] {
        &self.imports
    }

    fn get_exported_value(&self, _: &ExportDefinition) -> Result<ExportedValue, PartError> {
        Err(PartError::new("callback part has no exports"))
    }

    fn set_import(&self, _: &ImportDefinition, _: &[Export]) -> Result<(), PartError> {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }
}

// ============================================================================
// Adapters
// ============================================================================

/// Adapter part forwarding `from` exports to `to`.
pub fn adapter(from: &str, to: &str) -> PartRef {
    adapter_with(from, to, AdapterFunction::forwarding(to))
}

/// Adapter part with a custom function.
pub fn adapter_with(from: &str, to: &str, function: AdapterFunction) -> PartRef {
    PartRef::new(SingleExportPart::new(adapter_export(from, to, function)))
}

/// Adapter part whose adapted exports carry a fixed value.
pub fn constant_adapter(from: &str, to: &str, value: &'static str) -> PartRef {
    let to_contract = to.to_string();
    adapter_with(
        from,
        to,
        AdapterFunction::new(move |_| {
            Ok(Some(Export::from_value(
                ExportDefinition::new(to_contract.clone()),
                Arc::new(value.to_string()),
            )))
        }),
    )
}

/// Part carrying one ready value.
pub fn value_part<T: Send + Sync + 'static>(contract: &str, value: T) -> PartRef {
    PartRef::new(SingleExportPart::new(Export::from_value(
        ExportDefinition::new(contract),
        Arc::new(value),
    )))
}

/// Batch adding `parts`.
pub fn adding(parts: &[PartRef]) -> CompositionBatch {
    CompositionBatch::from_parts(parts.iter().cloned(), std::iter::empty())
}

/// Batch removing `parts`.
pub fn removing(parts: &[PartRef]) -> CompositionBatch {
    CompositionBatch::from_parts(std::iter::empty(), parts.iter().cloned())
}

/// Weak handle for callbacks that call back into the container.
pub fn weak(container: &Arc<CompositionContainer>) -> Weak<CompositionContainer> {
    Arc::downgrade(container)
}

/// Sorted string values of `contract`.
pub fn strings(provider: &dyn ExportProvider, contract: &str) -> Vec<String> {
    let mut values: Vec<String> = provider
        .get_exported_values::<String>(contract)
        .expect("values")
        .iter()
        .map(|v| v.as_ref().clone())
        .collect();
    values.sort();
    values
}
