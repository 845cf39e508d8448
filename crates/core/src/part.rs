//! Composable parts
//!
//! A part declares the exports it produces and the imports it needs. The
//! engine never looks inside a part: it asks for export values by definition
//! and pushes matching exports into imports.
//!
//! Parts are shared across threads and called through `&self`, so
//! implementations keep their mutable state behind a lock.

use crate::definition::{ExportDefinition, ImportDefinition};
use crate::error::{MosaicError, PartError};
use crate::export::Export;
use crate::lazy::ExportedValue;
use crate::metadata::Metadata;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

// ============================================================================
// ComposablePart
// ============================================================================

/// A component instance participating in composition
///
/// # Contract
///
/// - `export_definitions` and `import_definitions` return the same
///   definitions (same declaration identity) for the lifetime of the part.
/// - `get_exported_value` is only called with one of the part's own export
///   definitions, after the part's prerequisite imports have been set.
/// - `set_import` receives 0 or 1 export for single-cardinality imports and
///   the full ordered match set for `ZeroOrMore` imports. It may be called
///   again for recomposable imports.
pub trait ComposablePart: Send + Sync {
    /// Exports this part produces
    fn export_definitions(&self) -> &[ExportDefinition];

    /// Imports this part needs
    fn import_definitions(&self) -> &[ImportDefinition];

    /// Part-level metadata
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    /// Produce the value for one of this part's exports
    fn get_exported_value(&self, definition: &ExportDefinition)
        -> Result<ExportedValue, PartError>;

    /// Inject the exports matched for one of this part's imports
    fn set_import(&self, definition: &ImportDefinition, exports: &[Export])
        -> Result<(), PartError>;

    /// Called once all imports have been set, and again after recomposition
    fn on_composed(&self) -> Result<(), PartError> {
        Ok(())
    }

    /// Called after the removal of this part has been committed
    fn on_released(&self) {}

    /// Name used in diagnostics
    fn display_name(&self) -> String {
        let contracts: Vec<&str> = self
            .export_definitions()
            .iter()
            .map(ExportDefinition::contract_name)
            .collect();
        if contracts.is_empty() {
            "part".to_string()
        } else {
            format!("part exporting [{}]", contracts.join(", "))
        }
    }
}

// ============================================================================
// PartRef
// ============================================================================

/// Shared handle to a part with reference identity
///
/// Two handles are equal only when they point at the same part instance.
#[derive(Clone)]
pub struct PartRef(Arc<dyn ComposablePart>);

impl PartRef {
    /// Wrap a part
    pub fn new<P: ComposablePart + 'static>(part: P) -> Self {
        PartRef(Arc::new(part))
    }

    /// Wrap an existing shared part, keeping its identity
    pub fn from_arc<P: ComposablePart + 'static>(part: Arc<P>) -> Self {
        PartRef(part)
    }

    /// The shared part
    pub fn as_arc(&self) -> &Arc<dyn ComposablePart> {
        &self.0
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl From<Arc<dyn ComposablePart>> for PartRef {
    fn from(part: Arc<dyn ComposablePart>) -> Self {
        PartRef(part)
    }
}

impl Deref for PartRef {
    type Target = dyn ComposablePart;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for PartRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for PartRef {}

impl Hash for PartRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for PartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartRef({} @ {:p})", self.0.display_name(), self.addr())
    }
}

// ============================================================================
// SingleExportPart
// ============================================================================

/// A part that publishes one ready-made export and imports nothing
///
/// Created by [`CompositionBatch::add_export`](crate::batch::CompositionBatch::add_export).
pub struct SingleExportPart {
    export: Export,
    definitions: [ExportDefinition; 1],
}

impl SingleExportPart {
    /// Wrap an export
    pub fn new(export: Export) -> Self {
        let definitions = [export.definition().clone()];
        Self {
            export,
            definitions,
        }
    }

    /// The wrapped export
    pub fn export(&self) -> &Export {
        &self.export
    }
}

impl ComposablePart for SingleExportPart {
    fn export_definitions(&self) -> &[ExportDefinition] {
        &self.definitions
    }

    fn import_definitions(&self) -> &[ImportDefinition] {
        &[]
    }

    fn get_exported_value(
        &self,
        definition: &ExportDefinition,
    ) -> Result<ExportedValue, PartError> {
        if !definition.same_as(self.export.definition()) {
            return Err(PartError::new(format!(
                "export {} is not declared by this part",
                definition
            )));
        }
        self.export.value().map_err(|e| match e {
            MosaicError::Part(part_error) => part_error,
            other => PartError::new(other.to_string()),
        })
    }

    fn set_import(&self, definition: &ImportDefinition, _: &[Export]) -> Result<(), PartError> {
        Err(PartError::new(format!(
            "import {} is not declared by this part",
            definition
        )))
    }

    fn display_name(&self) -> String {
        format!("export {}", self.export.definition())
    }
}
