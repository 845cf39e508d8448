//! Part definitions and catalogs
//!
//! A [`ComposablePartDefinition`] describes a part before it exists: its
//! exports, imports and metadata, plus a factory. A [`Catalog`] is a
//! read-only list of definitions the engine can instantiate on demand.

use crate::definition::{ExportDefinition, ImportDefinition};
use crate::error::PartError;
use crate::metadata::Metadata;
use crate::part::{ComposablePart, PartRef};
use std::fmt;
use std::sync::Arc;

/// Blueprint for creating parts
///
/// Parts created by a definition declare their exports in the same order as
/// the definition; the engine maps definition exports to part exports by
/// position.
pub trait ComposablePartDefinition: Send + Sync {
    /// Exports parts of this definition produce
    fn export_definitions(&self) -> &[ExportDefinition];

    /// Imports parts of this definition need
    fn import_definitions(&self) -> &[ImportDefinition];

    /// Definition-level metadata
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    /// Create a fresh part instance
    fn create_part(&self) -> Result<PartRef, PartError>;
}

/// Read-only source of part definitions
pub trait Catalog: Send + Sync {
    /// All part definitions, in a stable order
    fn parts(&self) -> Vec<Arc<dyn ComposablePartDefinition>>;
}

type PartFactory = Arc<dyn Fn() -> Result<PartRef, PartError> + Send + Sync>;

/// Part definition backed by a factory closure
#[derive(Clone)]
pub struct PartDefinition {
    exports: Vec<ExportDefinition>,
    imports: Vec<ImportDefinition>,
    metadata: Metadata,
    factory: PartFactory,
}

impl PartDefinition {
    /// Create a definition with its declared exports and imports
    pub fn new<F>(exports: Vec<ExportDefinition>, imports: Vec<ImportDefinition>, factory: F) -> Self
    where
        F: Fn() -> Result<PartRef, PartError> + Send + Sync + 'static,
    {
        Self {
            exports,
            imports,
            metadata: Metadata::new(),
            factory: Arc::new(factory),
        }
    }

    /// Create a definition from a part type's constructor
    pub fn of<P, F>(exports: Vec<ExportDefinition>, imports: Vec<ImportDefinition>, constructor: F) -> Self
    where
        P: ComposablePart + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        Self::new(exports, imports, move || Ok(PartRef::new(constructor())))
    }

    /// Attach definition metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl ComposablePartDefinition for PartDefinition {
    fn export_definitions(&self) -> &[ExportDefinition] {
        &self.exports
    }

    fn import_definitions(&self) -> &[ImportDefinition] {
        &self.imports
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn create_part(&self) -> Result<PartRef, PartError> {
        (self.factory)()
    }
}

impl fmt::Debug for PartDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartDefinition")
            .field("exports", &self.exports)
            .field("imports", &self.imports)
            .finish()
    }
}

/// In-memory catalog
#[derive(Default, Clone)]
pub struct PartCatalog {
    parts: Vec<Arc<dyn ComposablePartDefinition>>,
}

impl PartCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition
    pub fn with_part<D: ComposablePartDefinition + 'static>(mut self, definition: D) -> Self {
        self.parts.push(Arc::new(definition));
        self
    }

    /// Add a definition in place
    pub fn push(&mut self, definition: Arc<dyn ComposablePartDefinition>) {
        self.parts.push(definition);
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check for no definitions
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Catalog for PartCatalog {
    fn parts(&self) -> Vec<Arc<dyn ComposablePartDefinition>> {
        self.parts.clone()
    }
}
