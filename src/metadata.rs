//! Document-level metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::config::SCHEMA_VERSION;

/// The `metadata` block of a document.
///
/// Keys other than the named fields are kept in `properties` and written
/// back next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Format version the document follows.
    pub schema_version: String,
    /// Name of the annotated sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Who produced the annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotator: Option<String>,
    /// Free text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Version of this file, independent of the schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_version: Option<String>,
    /// Any other keys.
    #[serde(flatten)]
    pub properties: Map<String, Json>,
}

impl Metadata {
    /// Metadata with only the schema version set.
    #[must_use]
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            name: None,
            annotator: None,
            comment: None,
            file_version: None,
            properties: Map::new(),
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(SCHEMA_VERSION)
    }
}
