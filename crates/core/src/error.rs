//! Error types for the composition engine
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - [`MosaicError::ChangeRejected`]: a batch could not be previewed. Raising it
//!   guarantees the graph was rolled back to its state before the call.
//! - [`MosaicError::Composition`]: failures after the batch was committed
//!   (satisfying imports, post-commit notifications). Nothing is rolled back.
//! - [`MosaicError::CardinalityMismatch`]: a query-time error raised by the
//!   service facade; nothing was mutated.
//! - [`MosaicError::ReentrantCompose`] and [`MosaicError::Disposed`]: raised
//!   before any work starts.

use crate::definition::Cardinality;
use std::fmt;
use thiserror::Error;

/// Result type alias for composition operations
pub type MosaicResult<T> = std::result::Result<T, MosaicError>;

/// Error types for the composition engine
///
/// All variants are cheap to clone so that a failed lazy value can hand the
/// same error to every caller that forces it.
#[derive(Debug, Clone, Error)]
pub enum MosaicError {
    /// A batch was rejected while previewing; the graph is unchanged
    #[error("change rejected: {0}")]
    ChangeRejected(CompositionErrors),

    /// Failures after commit; the committed graph stays in place
    #[error("composition failed: {0}")]
    Composition(CompositionErrors),

    /// A query did not find the number of exports its cardinality requires
    #[error("cardinality mismatch for {import}: expected {cardinality}, found {found} export(s)")]
    CardinalityMismatch {
        /// Description of the import that was queried
        import: String,
        /// Cardinality the import asked for
        cardinality: Cardinality,
        /// Number of matching exports found
        found: usize,
    },

    /// `compose` was called directly while the same provider was composing
    #[error("compose is already in progress on this provider")]
    ReentrantCompose,

    /// The object has been disposed
    #[error("{0} has been disposed")]
    Disposed(&'static str),

    /// A required collaborator has not been wired yet
    #[error("{0} must be initialized before use")]
    NotInitialized(String),

    /// A write-once collaborator was set twice or after first use
    #[error("{0} is already initialized")]
    AlreadyInitialized(String),

    /// An exported value was not of the requested type
    #[error("exported value for contract '{contract}' is not a {expected}")]
    TypeMismatch {
        /// Contract the value was exported under
        contract: String,
        /// Rust type name that was requested
        expected: &'static str,
    },

    /// User part code failed
    #[error(transparent)]
    Part(#[from] PartError),

    /// An adapter was invalid or failed while adapting
    #[error("adapter for contract '{contract}' failed: {message}")]
    Adapter {
        /// Target contract of the adapter
        contract: String,
        /// What went wrong
        message: String,
    },

    /// A value or import was requested while it was already being produced
    #[error("composition cycle detected: {0}")]
    CompositionCycle(String),

    /// Nested satisfaction went deeper than the configured limit
    #[error("composition depth limit of {0} exceeded")]
    DepthExceeded(usize),

    /// Configuration could not be parsed or is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MosaicError {
    /// Build a `ChangeRejected` error from a list of reasons
    pub fn rejected(errors: impl Into<CompositionErrors>) -> Self {
        MosaicError::ChangeRejected(errors.into())
    }

    /// Build a `Composition` error from a list of reasons
    pub fn composition(errors: impl Into<CompositionErrors>) -> Self {
        MosaicError::Composition(errors.into())
    }

    /// Build an adapter error
    pub fn adapter(contract: impl Into<String>, message: impl Into<String>) -> Self {
        MosaicError::Adapter {
            contract: contract.into(),
            message: message.into(),
        }
    }

    /// Check whether this error guarantees a full rollback
    pub fn is_rejection(&self) -> bool {
        matches!(self, MosaicError::ChangeRejected(_))
    }

    /// Structured reasons carried by rejection and composition errors
    pub fn errors(&self) -> &[CompositionError] {
        match self {
            MosaicError::ChangeRejected(errors) | MosaicError::Composition(errors) => {
                errors.as_slice()
            }
            _ => &[],
        }
    }

    /// Flatten this error into structured composition errors
    ///
    /// Rejection and composition errors contribute their reasons; any other
    /// error becomes a single reason classified by [`CompositionErrorKind::from_error`].
    pub fn into_composition_errors(self) -> Vec<CompositionError> {
        match self {
            MosaicError::ChangeRejected(errors) | MosaicError::Composition(errors) => errors.0,
            other => vec![CompositionError::new(
                CompositionErrorKind::from_error(&other),
                other.to_string(),
            )],
        }
    }
}

/// Error returned by user-authored part code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PartError {
    message: String,
}

impl PartError {
    /// Create a part error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for PartError {
    fn from(message: &str) -> Self {
        PartError::new(message)
    }
}

impl From<String> for PartError {
    fn from(message: String) -> Self {
        PartError::new(message)
    }
}

// ============================================================================
// Structured composition errors
// ============================================================================

/// Classification of a single composition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositionErrorKind {
    /// An import found the wrong number of exports
    ImportCardinalityMismatch,
    /// A change would alter the exports of an import that is not recomposable
    PreventedByExistingImport,
    /// A part depends on itself through prerequisite imports
    ImportCycle,
    /// User part code failed while setting an import or producing a value
    PartFailure,
    /// An adapter export is malformed
    InvalidAdapter,
    /// An adapter failed while adapting an export
    AdapterFailure,
    /// A lazily produced value failed
    ValueProduction,
    /// Anything else
    Other,
}

impl CompositionErrorKind {
    /// Classify an arbitrary engine error
    pub fn from_error(error: &MosaicError) -> Self {
        match error {
            MosaicError::CardinalityMismatch { .. } => CompositionErrorKind::ImportCardinalityMismatch,
            MosaicError::Part(_) => CompositionErrorKind::PartFailure,
            MosaicError::Adapter { .. } => CompositionErrorKind::AdapterFailure,
            MosaicError::CompositionCycle(_) | MosaicError::DepthExceeded(_) => {
                CompositionErrorKind::ImportCycle
            }
            MosaicError::TypeMismatch { .. } => CompositionErrorKind::ValueProduction,
            MosaicError::ChangeRejected(errors) | MosaicError::Composition(errors) => errors
                .first()
                .map(|e| e.kind)
                .unwrap_or(CompositionErrorKind::Other),
            _ => CompositionErrorKind::Other,
        }
    }
}

impl fmt::Display for CompositionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositionErrorKind::ImportCardinalityMismatch => "import cardinality mismatch",
            CompositionErrorKind::PreventedByExistingImport => "prevented by existing import",
            CompositionErrorKind::ImportCycle => "import cycle",
            CompositionErrorKind::PartFailure => "part failure",
            CompositionErrorKind::InvalidAdapter => "invalid adapter",
            CompositionErrorKind::AdapterFailure => "adapter failure",
            CompositionErrorKind::ValueProduction => "value production",
            CompositionErrorKind::Other => "error",
        };
        f.write_str(name)
    }
}

/// One structured reason a batch or part failed
///
/// Carries enough identity (part, import, contract) for a caller to work out
/// which member of a batch to drop before retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionError {
    /// What kind of failure this is
    pub kind: CompositionErrorKind,
    /// Display name of the part involved
    pub part: Option<String>,
    /// Description of the import involved
    pub import: Option<String>,
    /// Contract involved
    pub contract: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl CompositionError {
    /// Create an error with just a kind and message
    pub fn new(kind: CompositionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            part: None,
            import: None,
            contract: None,
            message: message.into(),
        }
    }

    /// Attach the part display name
    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    /// Attach the import description
    pub fn with_import(mut self, import: impl Into<String>) -> Self {
        self.import = Some(import.into());
        self
    }

    /// Attach the contract name
    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }
}

impl fmt::Display for CompositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(part) = &self.part {
            write!(f, " part '{}'", part)?;
        }
        if let Some(import) = &self.import {
            write!(f, " import {}", import)?;
        }
        if let Some(contract) = &self.contract {
            write!(f, " contract '{}'", contract)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered collection of composition errors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionErrors(Vec<CompositionError>);

impl CompositionErrors {
    /// Empty collection
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append one error
    pub fn push(&mut self, error: CompositionError) {
        self.0.push(error);
    }

    /// Append all reasons carried by an engine error
    pub fn merge(&mut self, error: MosaicError) {
        self.0.extend(error.into_composition_errors());
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for no errors
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the errors
    pub fn as_slice(&self) -> &[CompositionError] {
        &self.0
    }

    /// Iterate the errors
    pub fn iter(&self) -> std::slice::Iter<'_, CompositionError> {
        self.0.iter()
    }

    /// First error, if any
    pub fn first(&self) -> Option<&CompositionError> {
        self.0.first()
    }

    /// `Ok(())` when empty, otherwise a rejection
    pub fn into_rejection(self) -> MosaicResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(MosaicError::ChangeRejected(self))
        }
    }

    /// `Ok(())` when empty, otherwise a post-commit composition error
    pub fn into_composition(self) -> MosaicResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(MosaicError::Composition(self))
        }
    }
}

impl From<Vec<CompositionError>> for CompositionErrors {
    fn from(errors: Vec<CompositionError>) -> Self {
        Self(errors)
    }
}

impl From<CompositionError> for CompositionErrors {
    fn from(error: CompositionError) -> Self {
        Self(vec![error])
    }
}

impl IntoIterator for CompositionErrors {
    type Item = CompositionError;
    type IntoIter = std::vec::IntoIter<CompositionError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for CompositionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            write!(f, "{} {}", if i == 0 { ":" } else { ";" }, error)?;
        }
        Ok(())
    }
}
