//! Composition configuration via `mosaic.toml`
//!
//! Options can be built in code, parsed from a TOML string or read from a
//! file. Every field has a serde default, so an empty file is a valid
//! configuration.

use mosaic_core::{MosaicError, MosaicResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "mosaic.toml";

/// Default bound on nested import satisfaction
pub const DEFAULT_MAX_COMPOSITION_DEPTH: usize = 100;

/// Options for a composition container and its providers
///
/// # Example
///
/// ```toml
/// thread_safe = true
/// disable_silent_rejection = false
/// adaptation = true
/// max_composition_depth = 100
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionOptions {
    /// Serialize compose calls across threads with a re-entrant lock.
    /// When off, a compose from another thread while one runs is rejected.
    #[serde(default)]
    pub thread_safe: bool,
    /// Skip the preview pass; import failures surface when imports are
    /// satisfied instead of rejecting the batch.
    #[serde(default)]
    pub disable_silent_rejection: bool,
    /// Put an adapting provider in front of the part and catalog providers.
    #[serde(default = "default_adaptation")]
    pub adaptation: bool,
    /// Maximum nesting of import satisfaction on one thread.
    #[serde(default = "default_max_composition_depth")]
    pub max_composition_depth: usize,
}

fn default_adaptation() -> bool {
    true
}

fn default_max_composition_depth() -> usize {
    DEFAULT_MAX_COMPOSITION_DEPTH
}

impl Default for CompositionOptions {
    fn default() -> Self {
        Self {
            thread_safe: false,
            disable_silent_rejection: false,
            adaptation: default_adaptation(),
            max_composition_depth: default_max_composition_depth(),
        }
    }
}

impl CompositionOptions {
    /// Options with thread-safe composition enabled
    pub fn thread_safe() -> Self {
        Self {
            thread_safe: true,
            ..Self::default()
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `max_composition_depth` is zero.
    pub fn validate(&self) -> MosaicResult<()> {
        if self.max_composition_depth == 0 {
            return Err(MosaicError::InvalidConfig(
                "max_composition_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate options from TOML text
    pub fn from_toml_str(content: &str) -> MosaicResult<Self> {
        let options: CompositionOptions = toml::from_str(content)
            .map_err(|e| MosaicError::InvalidConfig(format!("Failed to parse options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Read, parse and validate options from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> MosaicResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MosaicError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            MosaicError::InvalidConfig(msg) => {
                MosaicError::InvalidConfig(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> MosaicResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MosaicError::InvalidConfig(format!("Failed to serialize options: {}", e)))
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Mosaic composition configuration
#
# Serialize compose calls across threads (default: false).
#   false = a compose from another thread while one is running is rejected
#   true  = compose calls wait for each other; nested compose on the same
#           thread still proceeds
thread_safe = false

# Skip previewing imports before commit (default: false).
# When true, unsatisfiable imports are reported after commit instead of
# rejecting the whole batch.
disable_silent_rejection = false

# Enable contract adaptation through adapter exports (default: true).
adaptation = true

# Maximum nesting of import satisfaction on one thread (default: 100).
max_composition_depth = 100
"#
    }
}
