//! Composition Engine Integration Tests
//!
//! End-to-end tests through `CompositionContainer`:
//! - adapters: contract adaptation and its recomposition
//! - recomposition: re-injection of recomposable imports
//! - atomicity: rejected batches leave nothing behind
//! - reentrancy: composition triggered from inside composition
//! - concurrency: thread-safe and non-thread-safe containers
//! - service: cardinality-checked queries
//! - catalog: on-demand parts from a catalog
//! - config: options loaded from `mosaic.toml`

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod catalog;
mod concurrency;
mod recomposition;
mod reentrancy;
