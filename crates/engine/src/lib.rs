//! Composition engine for Mosaic
//!
//! This crate orchestrates the core data model and the concurrency layer:
//! - CompositionContainer: wiring of providers, compose entry points, dispose
//! - PartExportProvider: atomic batch processing over explicitly added parts
//! - ImportEngine: preview, satisfy, release and recomposition of imports
//! - AdaptingExportProvider: contract adapters and their change propagation
//! - AggregateExportProvider / CatalogExportProvider: provider composition
//! - ExportProviderExt: typed, cardinality-checked queries
//! - Configuration (`mosaic.toml`) and composition metrics
//!
//! The engine is the only component that knows about:
//! - Change notification between providers
//! - Which providers an import resolves against
//! - When parts are satisfied relative to a batch's commit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapting;
pub mod aggregate;
pub mod catalog_provider;
pub mod config;
pub mod container;
pub mod events;
pub mod import_engine;
pub mod metrics;
pub mod part_provider;
pub mod provider;
pub mod service;

pub use adapting::{
    adapter_export, adapter_metadata, AdaptingExportProvider, AdapterFunction, ADAPTER_CONTRACT,
    FROM_CONTRACT_KEY, TO_CONTRACT_KEY,
};
pub use aggregate::AggregateExportProvider;
pub use catalog_provider::CatalogExportProvider;
pub use config::{CompositionOptions, CONFIG_FILE_NAME, DEFAULT_MAX_COMPOSITION_DEPTH};
pub use container::CompositionContainer;
pub use events::{ChangeListener, ChangeNotifier, ExportsChangeEvent, ListenerId};
pub use import_engine::{ImportEngine, ImportState};
pub use metrics::{CompositionMetrics, MetricsSnapshot};
pub use part_provider::PartExportProvider;
pub use provider::{ExportProvider, ExportSelection};
pub use service::ExportProviderExt;
