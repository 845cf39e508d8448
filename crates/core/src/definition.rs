//! Export and import definitions
//!
//! These are the immutable contract descriptions parts publish:
//! - [`ExportDefinition`]: a contract name plus metadata describing one export
//! - [`ImportDefinition`]: a constraint over export definitions plus the
//!   cardinality, recomposition and prerequisite flags of one import
//!
//! Both wrap their data in an `Arc` so they are cheap to clone into export
//! value getters and transaction actions. Clones keep the declaration
//! identity, which is what parts use to recognise their own definitions.

use crate::metadata::Metadata;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// Cardinality
// ============================================================================

/// How many exports an import accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Exactly one matching export is required
    ExactlyOne,
    /// Zero or one matching export
    ZeroOrOne,
    /// Any number of matching exports, including none
    ZeroOrMore,
}

impl Cardinality {
    /// Check whether `count` matching exports satisfy this cardinality
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Cardinality::ExactlyOne => count == 1,
            Cardinality::ZeroOrOne => count <= 1,
            Cardinality::ZeroOrMore => true,
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// ExportDefinition
// ============================================================================

#[derive(Debug)]
struct ExportDefinitionInner {
    contract_name: String,
    metadata: Metadata,
}

/// Description of one export: a contract name and its metadata
///
/// Equality compares contract name (case-sensitive) and metadata. Use
/// [`ExportDefinition::same_as`] to compare declaration identity.
#[derive(Clone)]
pub struct ExportDefinition {
    inner: Arc<ExportDefinitionInner>,
}

impl ExportDefinition {
    /// Create a definition with no metadata
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self::with_metadata(contract_name, Metadata::new())
    }

    /// Create a definition with metadata
    pub fn with_metadata(contract_name: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            inner: Arc::new(ExportDefinitionInner {
                contract_name: contract_name.into(),
                metadata,
            }),
        }
    }

    /// Contract name
    pub fn contract_name(&self) -> &str {
        &self.inner.contract_name
    }

    /// Metadata map
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Check whether both values refer to the same declaration
    pub fn same_as(&self, other: &ExportDefinition) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ExportDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
            || (self.inner.contract_name == other.inner.contract_name
                && self.inner.metadata == other.inner.metadata)
    }
}

impl Eq for ExportDefinition {}

impl fmt::Debug for ExportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDefinition")
            .field("contract_name", &self.inner.contract_name)
            .field("metadata", &self.inner.metadata)
            .finish()
    }
}

impl fmt::Display for ExportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.inner.contract_name)
    }
}

// ============================================================================
// ImportDefinition
// ============================================================================

/// Predicate over export definitions used by custom constraints
pub type ExportPredicate = Arc<dyn Fn(&ExportDefinition) -> bool + Send + Sync>;

/// The matching rule of an import
#[derive(Clone)]
pub enum ImportConstraint {
    /// Match by contract name; every listed metadata key must be present
    Contract {
        /// Contract name to match exactly
        contract_name: String,
        /// Metadata keys an export must carry
        required_metadata: Vec<String>,
    },
    /// Match with an arbitrary predicate
    Predicate {
        /// Text used in diagnostics
        description: String,
        /// The predicate
        predicate: ExportPredicate,
    },
}

impl ImportConstraint {
    /// Evaluate the constraint against an export definition
    pub fn is_satisfied_by(&self, definition: &ExportDefinition) -> bool {
        match self {
            ImportConstraint::Contract {
                contract_name,
                required_metadata,
            } => {
                definition.contract_name() == contract_name
                    && required_metadata
                        .iter()
                        .all(|key| definition.metadata().contains_key(key))
            }
            ImportConstraint::Predicate { predicate, .. } => predicate(definition),
        }
    }
}

impl fmt::Debug for ImportConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportConstraint::Contract {
                contract_name,
                required_metadata,
            } => f
                .debug_struct("Contract")
                .field("contract_name", contract_name)
                .field("required_metadata", required_metadata)
                .finish(),
            ImportConstraint::Predicate { description, .. } => f
                .debug_struct("Predicate")
                .field("description", description)
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
struct ImportDefinitionInner {
    constraint: ImportConstraint,
    cardinality: Cardinality,
    is_recomposable: bool,
    is_prerequisite: bool,
}

/// Description of one import
///
/// Equality and hashing are by declaration identity: two imports built with
/// the same arguments are still distinct imports.
///
/// ```
/// use mosaic_core::definition::{Cardinality, ExportDefinition, ImportDefinition};
///
/// let import = ImportDefinition::contract("Logger", Cardinality::ExactlyOne).recomposable(true);
/// assert!(import.is_constraint_satisfied_by(&ExportDefinition::new("Logger")));
/// assert!(!import.is_constraint_satisfied_by(&ExportDefinition::new("logger")));
/// assert!(import.is_recomposable());
/// ```
#[derive(Clone)]
pub struct ImportDefinition {
    inner: Arc<ImportDefinitionInner>,
}

impl ImportDefinition {
    /// Create an import from a constraint and cardinality
    pub fn new(constraint: ImportConstraint, cardinality: Cardinality) -> Self {
        Self {
            inner: Arc::new(ImportDefinitionInner {
                constraint,
                cardinality,
                is_recomposable: false,
                is_prerequisite: false,
            }),
        }
    }

    /// Create a contract-based import
    pub fn contract(contract_name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self::new(
            ImportConstraint::Contract {
                contract_name: contract_name.into(),
                required_metadata: Vec::new(),
            },
            cardinality,
        )
    }

    /// Create an import matching a predicate
    pub fn predicate<F>(description: impl Into<String>, cardinality: Cardinality, predicate: F) -> Self
    where
        F: Fn(&ExportDefinition) -> bool + Send + Sync + 'static,
    {
        Self::new(
            ImportConstraint::Predicate {
                description: description.into(),
                predicate: Arc::new(predicate),
            },
            cardinality,
        )
    }

    /// Require a metadata key (contract-based imports only)
    pub fn with_required_metadata(mut self, key: impl Into<String>) -> Self {
        if let ImportConstraint::Contract {
            required_metadata, ..
        } = &mut Arc::make_mut(&mut self.inner).constraint
        {
            required_metadata.push(key.into());
        }
        self
    }

    /// Set whether the import is re-satisfied when its exports change
    pub fn recomposable(mut self, recomposable: bool) -> Self {
        Arc::make_mut(&mut self.inner).is_recomposable = recomposable;
        self
    }

    /// Set whether the import must be satisfied before the part can export
    pub fn prerequisite(mut self, prerequisite: bool) -> Self {
        Arc::make_mut(&mut self.inner).is_prerequisite = prerequisite;
        self
    }

    /// Matching rule
    pub fn constraint(&self) -> &ImportConstraint {
        &self.inner.constraint
    }

    /// Cardinality
    pub fn cardinality(&self) -> Cardinality {
        self.inner.cardinality
    }

    /// Whether the import is recomposable
    pub fn is_recomposable(&self) -> bool {
        self.inner.is_recomposable
    }

    /// Whether the import is a prerequisite
    pub fn is_prerequisite(&self) -> bool {
        self.inner.is_prerequisite
    }

    /// Contract name for contract-based imports
    pub fn contract_name(&self) -> Option<&str> {
        match &self.inner.constraint {
            ImportConstraint::Contract { contract_name, .. } => Some(contract_name),
            ImportConstraint::Predicate { .. } => None,
        }
    }

    /// Evaluate the constraint against an export definition
    pub fn is_constraint_satisfied_by(&self, definition: &ExportDefinition) -> bool {
        self.inner.constraint.is_satisfied_by(definition)
    }

    /// Conservative check whether exports of `contract_name` could match
    ///
    /// Exact for contract-based imports; predicate imports answer `true`.
    pub fn may_match_contract(&self, contract_name: &str) -> bool {
        match &self.inner.constraint {
            ImportConstraint::Contract {
                contract_name: name,
                ..
            } => name == contract_name,
            ImportConstraint::Predicate { .. } => true,
        }
    }
}

impl PartialEq for ImportDefinition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ImportDefinition {}

impl Hash for ImportDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Debug for ImportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportDefinition")
            .field("constraint", &self.inner.constraint)
            .field("cardinality", &self.inner.cardinality)
            .field("is_recomposable", &self.inner.is_recomposable)
            .field("is_prerequisite", &self.inner.is_prerequisite)
            .finish()
    }
}

impl fmt::Display for ImportDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.constraint {
            ImportConstraint::Contract { contract_name, .. } => {
                write!(f, "contract '{}' ({})", contract_name, self.inner.cardinality)
            }
            ImportConstraint::Predicate { description, .. } => {
                write!(f, "{} ({})", description, self.inner.cardinality)
            }
        }
    }
}
