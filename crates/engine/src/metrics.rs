//! Composition counters
//!
//! # Memory Ordering
//!
//! All counters use Relaxed ordering. They are observational only and do
//! not synchronize any other memory operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by a container's providers and import engines
#[derive(Debug, Default)]
pub struct CompositionMetrics {
    batches_started: AtomicU64,
    batches_committed: AtomicU64,
    batches_rejected: AtomicU64,
    satisfy_failures: AtomicU64,
    recompositions: AtomicU64,
}

impl CompositionMetrics {
    /// Fresh counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a compose call that got past the fast exits
    pub fn record_start(&self) {
        self.batches_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a committed batch
    pub fn record_commit(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected batch
    pub fn record_reject(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a part whose imports could not be satisfied after commit
    pub fn record_satisfy_failure(&self) {
        self.satisfy_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one re-injection of recomposable imports into a part
    pub fn record_recomposition(&self) {
        self.recompositions.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_started: self.batches_started.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            satisfy_failures: self.satisfy_failures.load(Ordering::Relaxed),
            recompositions: self.recompositions.load(Ordering::Relaxed),
        }
    }
}

/// Composition statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Compose calls that opened a transaction
    pub batches_started: u64,
    /// Batches committed
    pub batches_committed: u64,
    /// Batches rejected and rolled back
    pub batches_rejected: u64,
    /// Parts that failed to satisfy after commit
    pub satisfy_failures: u64,
    /// Recomposition injections
    pub recompositions: u64,
}

impl MetricsSnapshot {
    /// Rejected batches over started batches
    pub fn reject_rate(&self) -> f64 {
        if self.batches_started > 0 {
            self.batches_rejected as f64 / self.batches_started as f64
        } else {
            0.0
        }
    }
}
