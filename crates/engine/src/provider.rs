//! Export provider abstraction
//!
//! An [`ExportProvider`] answers "which exports match this import?". The
//! required method returns raw matches; the provided methods layer the
//! cardinality check on top:
//!
//! - [`ExportProvider::try_get_exports`] reports whether the match count fits
//!   the import's cardinality
//! - [`ExportProvider::get_exports`] returns an empty list on a mismatch and
//!   leaves enforcement to the caller
//!
//! Providers never force export values while enumerating.

use crate::events::ChangeNotifier;
use mosaic_concurrency::AtomicComposition;
use mosaic_core::{Cardinality, Export, ImportDefinition, MosaicResult};

/// Outcome of matching an import against a provider
#[derive(Debug, Clone)]
pub enum ExportSelection {
    /// The match count fits the import's cardinality
    Matched(Vec<Export>),
    /// An `ExactlyOne` import found nothing
    NoExports,
    /// A single-cardinality import found this many exports
    TooManyExports(usize),
}

impl ExportSelection {
    /// Apply `cardinality` to a raw match list
    pub fn from_matches(cardinality: Cardinality, exports: Vec<Export>) -> Self {
        match (cardinality, exports.len()) {
            (Cardinality::ExactlyOne, 0) => ExportSelection::NoExports,
            (Cardinality::ExactlyOne | Cardinality::ZeroOrOne, n) if n > 1 => {
                ExportSelection::TooManyExports(n)
            }
            _ => ExportSelection::Matched(exports),
        }
    }

    /// Number of matching exports found
    pub fn found(&self) -> usize {
        match self {
            ExportSelection::Matched(exports) => exports.len(),
            ExportSelection::NoExports => 0,
            ExportSelection::TooManyExports(n) => *n,
        }
    }

    /// Matched exports, or `None` on a cardinality mismatch
    pub fn into_matched(self) -> Option<Vec<Export>> {
        match self {
            ExportSelection::Matched(exports) => Some(exports),
            _ => None,
        }
    }
}

/// Source of exports
///
/// Pass the current [`AtomicComposition`] to see exports staged by a batch
/// that has not committed yet; pass `None` for the committed view.
pub trait ExportProvider: Send + Sync {
    /// All exports matching the import's constraint, in provider order
    fn get_exports_core(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>>;

    /// Change notifications for this provider's exports
    fn notifier(&self) -> &ChangeNotifier;

    /// Match and check cardinality
    fn try_get_exports(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<ExportSelection> {
        let exports = self.get_exports_core(import, atomic)?;
        Ok(ExportSelection::from_matches(import.cardinality(), exports))
    }

    /// Match, returning an empty list when the cardinality does not fit
    fn get_exports(
        &self,
        import: &ImportDefinition,
        atomic: Option<&AtomicComposition<'_>>,
    ) -> MosaicResult<Vec<Export>> {
        Ok(self
            .try_get_exports(import, atomic)?
            .into_matched()
            .unwrap_or_default())
    }
}
