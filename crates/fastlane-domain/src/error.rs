//! Error types for field extraction

use thiserror::Error;

/// Errors raised while reading a declared field off a partial snapshot
///
/// These are never swallowed by the tracker; they reach the caller of
/// `ingest`, which decides whether to abort or skip the snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The snapshot is not an object, so no field can be read from it
    #[error("Snapshot is not an object (found {0})")]
    NotAnObject(String),

    /// A stream-state wrapper carried a state name the extractor does not know
    #[error("Unknown stream state '{state}' for field '{field}'")]
    UnknownStreamState {
        /// Field being read
        field: String,
        /// Offending state name
        state: String,
    },

    /// The field exists but has an unexpected shape
    #[error("Unexpected shape for field '{field}': {reason}")]
    Shape {
        /// Field being read
        field: String,
        /// Human readable reason
        reason: String,
    },
}

impl ExtractionError {
    /// Convenience constructor for [`ExtractionError::Shape`]
    pub fn shape(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ExtractionError::Shape {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
