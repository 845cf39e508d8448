//! Metadata maps attached to parts and export definitions
//!
//! Metadata values are JSON values so that catalogs can carry arbitrary
//! declarative data without the engine knowing its shape.

use std::collections::BTreeMap;

pub use serde_json::Value as MetadataValue;

/// Ordered metadata map
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Look up a metadata entry as a string slice
///
/// Returns `None` when the key is missing or the value is not a string.
pub fn metadata_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(MetadataValue::as_str)
}

/// Build a metadata map from key/value pairs
///
/// ```
/// use mosaic_core::metadata::{metadata_from, metadata_str};
///
/// let metadata = metadata_from([("FromContract", "Old"), ("ToContract", "New")]);
/// assert_eq!(metadata_str(&metadata, "ToContract"), Some("New"));
/// ```
pub fn metadata_from<K, V, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    V: Into<MetadataValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
