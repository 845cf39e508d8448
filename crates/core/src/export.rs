//! Exports: a definition paired with a lazily produced value

use crate::definition::ExportDefinition;
use crate::error::{MosaicError, MosaicResult};
use crate::lazy::{ExportedValue, LazyValue};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

struct ExportInner {
    definition: ExportDefinition,
    value: LazyValue,
}

/// An export handed out by a provider
///
/// Clones share one value cell, so the getter runs at most once per `Export`
/// no matter how many clones force it. Providers never force values while
/// enumerating exports.
#[derive(Clone)]
pub struct Export {
    inner: Arc<ExportInner>,
}

impl Export {
    /// Create an export whose value is produced on first use
    pub fn new<F>(definition: ExportDefinition, getter: F) -> Self
    where
        F: FnOnce() -> MosaicResult<ExportedValue> + Send + 'static,
    {
        Self {
            inner: Arc::new(ExportInner {
                definition,
                value: LazyValue::new(getter),
            }),
        }
    }

    /// Create an export around an existing value
    pub fn from_value(definition: ExportDefinition, value: ExportedValue) -> Self {
        Self {
            inner: Arc::new(ExportInner {
                definition,
                value: LazyValue::ready(value),
            }),
        }
    }

    /// Create an export under `definition` that forwards to `source`'s value
    ///
    /// The source value is not forced until the new export is.
    pub fn forwarding(definition: ExportDefinition, source: &Export) -> Self {
        let source = source.clone();
        Self::new(definition, move || source.value())
    }

    /// The export definition
    pub fn definition(&self) -> &ExportDefinition {
        &self.inner.definition
    }

    /// Contract name of the definition
    pub fn contract_name(&self) -> &str {
        self.inner.definition.contract_name()
    }

    /// Force and return the value
    pub fn value(&self) -> MosaicResult<ExportedValue> {
        self.inner.value.force()
    }

    /// Force the value and downcast it to `T`
    pub fn value_as<T: Any + Send + Sync>(&self) -> MosaicResult<Arc<T>> {
        downcast_value(self.contract_name(), self.value()?)
    }

    /// Whether the value has been produced (or failed)
    pub fn is_value_forced(&self) -> bool {
        self.inner.value.is_forced()
    }

    /// Check whether both handles share one value cell
    pub fn ptr_eq(&self, other: &Export) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Export")
            .field("definition", &self.inner.definition)
            .field("value", &self.inner.value)
            .finish()
    }
}

/// Downcast an exported value, reporting the contract on mismatch
pub fn downcast_value<T: Any + Send + Sync>(
    contract: &str,
    value: ExportedValue,
) -> MosaicResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| MosaicError::TypeMismatch {
            contract: contract.to_string(),
            expected: type_name::<T>(),
        })
}
