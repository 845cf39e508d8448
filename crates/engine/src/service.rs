//! Typed query facade
//!
//! [`ExportProviderExt`] is implemented for every [`ExportProvider`] and adds
//! contract-name queries with cardinality enforcement:
//!
//! | Query | Cardinality | 0 found | more than 1 found |
//! |-------|-------------|---------|-------------------|
//! | `get_export` | ExactlyOne | `CardinalityMismatch` | `CardinalityMismatch` |
//! | `get_export_or_default` | ZeroOrOne | `None` | `None` |
//! | `get_exports_of` | ZeroOrMore | empty | all |

use crate::provider::{ExportProvider, ExportSelection};
use mosaic_core::{Cardinality, Export, ImportDefinition, MosaicError, MosaicResult};
use std::any::Any;
use std::sync::Arc;

/// Contract-name queries over any provider
pub trait ExportProviderExt: ExportProvider {
    /// Matches for `import`, enforcing `ExactlyOne`
    ///
    /// A `ZeroOrOne` import that matches more than once yields an empty list.
    fn get_exports_checked(&self, import: &ImportDefinition) -> MosaicResult<Vec<Export>> {
        match self.try_get_exports(import, None)? {
            ExportSelection::Matched(exports) => Ok(exports),
            selection if import.cardinality() == Cardinality::ExactlyOne => {
                Err(MosaicError::CardinalityMismatch {
                    import: import.to_string(),
                    cardinality: import.cardinality(),
                    found: selection.found(),
                })
            }
            _ => Ok(Vec::new()),
        }
    }

    /// The single export of `contract`
    fn get_export(&self, contract: &str) -> MosaicResult<Export> {
        let import = ImportDefinition::contract(contract, Cardinality::ExactlyOne);
        self.get_exports_checked(&import)?
            .pop()
            .ok_or_else(|| MosaicError::CardinalityMismatch {
                import: import.to_string(),
                cardinality: Cardinality::ExactlyOne,
                found: 0,
            })
    }

    /// The export of `contract`, if exactly one exists
    fn get_export_or_default(&self, contract: &str) -> MosaicResult<Option<Export>> {
        let import = ImportDefinition::contract(contract, Cardinality::ZeroOrOne);
        Ok(self.get_exports_checked(&import)?.into_iter().next())
    }

    /// Every export of `contract`, in provider order
    fn get_exports_of(&self, contract: &str) -> MosaicResult<Vec<Export>> {
        let import = ImportDefinition::contract(contract, Cardinality::ZeroOrMore);
        self.get_exports_checked(&import)
    }

    /// The single value of `contract`, downcast to `T`
    fn get_exported_value<T: Any + Send + Sync>(&self, contract: &str) -> MosaicResult<Arc<T>> {
        self.get_export(contract)?.value_as::<T>()
    }

    /// The value of `contract` if exactly one exists, downcast to `T`
    fn get_exported_value_or_default<T: Any + Send + Sync>(
        &self,
        contract: &str,
    ) -> MosaicResult<Option<Arc<T>>> {
        self.get_export_or_default(contract)?
            .map(|export| export.value_as::<T>())
            .transpose()
    }

    /// Every value of `contract`, downcast to `T`
    fn get_exported_values<T: Any + Send + Sync>(&self, contract: &str) -> MosaicResult<Vec<Arc<T>>> {
        self.get_exports_of(contract)?
            .iter()
            .map(Export::value_as::<T>)
            .collect()
    }

    /// Whether any export of `contract` exists
    fn is_present(&self, contract: &str) -> MosaicResult<bool> {
        Ok(!self.get_exports_of(contract)?.is_empty())
    }
}

impl<P: ExportProvider + ?Sized> ExportProviderExt for P {}
