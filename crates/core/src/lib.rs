//! Core types and traits for Mosaic
//!
//! This crate defines the data model every other layer builds on:
//! - ExportDefinition / ImportDefinition: contracts, metadata and cardinality
//! - Export: a definition paired with a lazily produced value
//! - LazyValue: one-shot deferred value cell
//! - ComposablePart / PartRef: the capability trait for parts and its handle
//! - ComposablePartDefinition / Catalog: blueprints for creating parts
//! - CompositionBatch: additions and removals applied atomically
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod catalog;
pub mod definition;
pub mod error;
pub mod export;
pub mod lazy;
pub mod metadata;
pub mod part;

pub use batch::CompositionBatch;
pub use catalog::{Catalog, ComposablePartDefinition, PartCatalog, PartDefinition};
pub use definition::{Cardinality, ExportDefinition, ExportPredicate, ImportConstraint, ImportDefinition};
pub use error::{
    CompositionError, CompositionErrorKind, CompositionErrors, MosaicError, MosaicResult,
    PartError,
};
pub use export::{downcast_value, Export};
pub use lazy::{ExportedValue, LazyValue};
pub use metadata::{metadata_from, metadata_str, Metadata, MetadataValue};
pub use part::{ComposablePart, PartRef, SingleExportPart};
