//! Error types for openlabel.
//!
//! Errors are split by how callers are expected to react to them:
//!
//! - [`ValidationError`]: caller-supplied input is structurally wrong. These are
//!   hard failures and nothing is mutated.
//! - [`WriteError`]: the request is well-formed but cannot be applied to the
//!   current document. These are soft: a warning is logged, the document stays
//!   unchanged and the caller may ignore the error.
//! - [`FormatError`]: a structured tree could not be turned back into a document.

use thiserror::Error;

use crate::element::ElementKind;
use crate::uid::Uid;

/// Validation errors that occur during input validation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Identifier '{value}' is neither an integer nor a UUID")]
    MalformedIdentifier {
        value: String,
    },

    #[error("Pose must contain exactly 16 values, got {len}")]
    InvalidPose {
        len: usize,
    },

    #[error("Invalid frame interval: start ({start}) must not exceed end ({end})")]
    InvalidFrameInterval {
        start: u64,
        end: u64,
    },

    #[error("Invalid attribute '{name}': {reason}")]
    InvalidAttribute {
        name: String,
        reason: String,
    },

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Field '{field}' holds a NaN or infinite value")]
    NonFiniteValue {
        field: String,
    },

    #[error("Invalid calibration '{field}': {reason}")]
    InvalidCalibration {
        field: String,
        reason: String,
    },
}

/// Soft failures: the write was discarded and the document is unchanged.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("Unknown {kind} '{uid}'")]
    UnknownElement {
        kind: ElementKind,
        uid: Uid,
    },

    #[error("Frame {frame} precedes the current frame {current}")]
    OutOfOrderFrame {
        frame: u64,
        current: u64,
    },

    #[error("Coordinate system '{name}' has not been declared")]
    UndeclaredCoordinateSystem {
        name: String,
    },

    #[error("Parent coordinate system '{parent}' of '{name}' has not been declared")]
    UnresolvedParentCoordinateSystem {
        name: String,
        parent: String,
    },

    #[error("Ontology already registered as '{uid}'")]
    DuplicateOntology {
        uid: String,
    },

    #[error("Coordinate system '{name}' already registered")]
    DuplicateCoordinateSystem {
        name: String,
    },

    #[error("Stream '{name}' has not been declared")]
    UnknownStream {
        name: String,
    },
}

/// Errors raised while rebuilding a document from a structured tree.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Missing root key '{root}'")]
    MissingRoot {
        root: String,
    },

    #[error("Unexpected shape at '{path}': expected {expected}")]
    UnexpectedShape {
        path: String,
        expected: &'static str,
    },

    #[error("Unknown attribute kind '{kind}'")]
    UnknownAttributeKind {
        kind: String,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
    },
}

impl FormatError {
    pub(crate) fn shape(path: impl Into<String>, expected: &'static str) -> Self {
        Self::UnexpectedShape {
            path: path.into(),
            expected,
        }
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Top-level error type for openlabel.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Write rejected: {0}")]
    Write(#[from] WriteError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

impl LabelError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a format error.
    #[must_use]
    pub const fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    /// Returns true if the document is guaranteed to be unchanged and usable.
    ///
    /// Soft errors are warnings surfaced as values; hard errors are not.
    #[must_use]
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::Write(_))
    }

    /// Returns the inner write error, if any.
    #[must_use]
    pub const fn as_write(&self) -> Option<&WriteError> {
        match self {
            Self::Write(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LabelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.into())
    }
}

/// Result type alias for openlabel operations.
pub type LabelResult<T> = Result<T, LabelError>;
