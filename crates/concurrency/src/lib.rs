//! Concurrency layer for Mosaic
//!
//! This crate provides the transaction and locking primitives composition
//! runs on:
//! - AtomicComposition: nested transaction scope with staged values,
//!   revert actions and complete actions
//! - OwnerId: identity used to key staged values
//! - CompositionLock: optional re-entrant serialization of compose calls
//! - SnapshotCell: swap-only holder for immutable snapshots

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod lock;

pub use atomic::{AtomicComposition, CompleteAction, OwnerId, RevertAction};
pub use lock::{CompositionLock, SnapshotCell};
