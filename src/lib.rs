//! Mosaic - dynamic composition engine
//!
//! Mosaic wires independently authored parts together by contract name. Parts
//! export values and import values from other parts; a container resolves the
//! imports, keeps them up to date as parts come and go, and can adapt exports
//! from one contract to another.
//!
//! # Quick Start
//!
//! ```
//! use mosaic::{AdapterFunction, CompositionBatch, CompositionContainer, ExportProviderExt};
//!
//! let container = CompositionContainer::new()?;
//!
//! let mut batch = CompositionBatch::new();
//! batch.add_exported_value("Old", 42i32);
//! batch.add_export(mosaic::adapter_export("Old", "New", AdapterFunction::forwarding("New")));
//! container.compose(&batch)?;
//!
//! assert_eq!(*container.get_exported_value::<i32>("New")?, 42);
//! # Ok::<(), mosaic::MosaicError>(())
//! ```
//!
//! # Architecture
//!
//! - `mosaic-core`: definitions, exports, parts, catalogs, batches, errors
//! - `mosaic-concurrency`: atomic composition scopes and locking
//! - `mosaic-engine`: providers, the import engine and the container
//!
//! Changes are applied in batches. A batch either commits completely or is
//! rejected with [`MosaicError::ChangeRejected`] and leaves nothing behind.

pub use mosaic_concurrency::{AtomicComposition, CompositionLock, OwnerId, SnapshotCell};
pub use mosaic_core::*;
pub use mosaic_engine::*;
