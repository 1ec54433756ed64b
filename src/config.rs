//! Document configuration.

use crate::error::ValidationError;

/// Root key of the structured tree.
pub const ROOT_KEY: &str = "openlabel";

/// Schema version written by default.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Configuration for a [`crate::Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentConfig {
    /// Create every missing frame between the nearest earlier frame and a
    /// newly referenced one.
    pub backfill_missing_frames: bool,
    /// Issue UUIDs from the start instead of sequential integers.
    pub use_uuid: bool,
    /// Value of `metadata.schema_version` for new documents.
    pub schema_version: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            backfill_missing_frames: true,
            use_uuid: false,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

impl DocumentConfig {
    /// Checks the configuration before a document is built from it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` if `schema_version` is empty.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.schema_version.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "schema_version".to_string(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = DocumentConfig::default();
        assert!(cfg.backfill_missing_frames);
        assert!(!cfg.use_uuid);
        assert_eq!(cfg.schema_version, "1.0.0");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_version() {
        let cfg = DocumentConfig {
            schema_version: " ".to_string(),
            ..DocumentConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ValidationError::MissingField { .. })));
    }
}
