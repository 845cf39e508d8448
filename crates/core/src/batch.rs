//! Composition batches
//!
//! A batch collects parts to add and parts to remove so they can be composed
//! as one atomic change. Both sets keep insertion order and ignore duplicates
//! by part identity.

use crate::definition::ExportDefinition;
use crate::export::Export;
use crate::part::{PartRef, SingleExportPart};
use std::any::Any;
use std::sync::Arc;

/// A set of part additions and removals applied atomically
#[derive(Debug, Clone, Default)]
pub struct CompositionBatch {
    parts_to_add: Vec<PartRef>,
    parts_to_remove: Vec<PartRef>,
}

impl CompositionBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch from explicit add and remove lists
    pub fn from_parts(
        to_add: impl IntoIterator<Item = PartRef>,
        to_remove: impl IntoIterator<Item = PartRef>,
    ) -> Self {
        let mut batch = Self::new();
        for part in to_add {
            batch.add_part(part);
        }
        for part in to_remove {
            batch.remove_part(part);
        }
        batch
    }

    /// Schedule a part for addition
    pub fn add_part(&mut self, part: PartRef) {
        if !self.parts_to_add.contains(&part) {
            self.parts_to_add.push(part);
        }
    }

    /// Schedule a part for removal
    pub fn remove_part(&mut self, part: PartRef) {
        if !self.parts_to_remove.contains(&part) {
            self.parts_to_remove.push(part);
        }
    }

    /// Add a ready-made export, returning the part that carries it
    pub fn add_export(&mut self, export: Export) -> PartRef {
        let part = PartRef::new(SingleExportPart::new(export));
        self.add_part(part.clone());
        part
    }

    /// Add a value under a contract name, returning the part that carries it
    pub fn add_exported_value<T: Any + Send + Sync>(
        &mut self,
        contract_name: impl Into<String>,
        value: T,
    ) -> PartRef {
        self.add_export(Export::from_value(
            ExportDefinition::new(contract_name),
            Arc::new(value),
        ))
    }

    /// Parts scheduled for addition
    pub fn parts_to_add(&self) -> &[PartRef] {
        &self.parts_to_add
    }

    /// Parts scheduled for removal
    pub fn parts_to_remove(&self) -> &[PartRef] {
        &self.parts_to_remove
    }

    /// Check whether the batch changes nothing
    pub fn is_empty(&self) -> bool {
        self.parts_to_add.is_empty() && self.parts_to_remove.is_empty()
    }
}
