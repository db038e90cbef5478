//! Error types for the tracker

use fastlane_domain::ExtractionError;
use thiserror::Error;

/// Errors that can occur while tracking a stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// The extractor could not read a declared field off a snapshot
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// `ingest` or `mark_event` was called after `finalize`
    #[error("Tracker already finalized; reset it before starting a new stream")]
    AlreadyFinalized,

    /// `finalize` was called before any snapshot was ingested
    #[error("Nothing ingested: finalize needs at least one snapshot or a terminal response")]
    NothingIngested,

    /// Two conditions share a name
    #[error("Duplicate condition name: {0}")]
    DuplicateConditionName(String),

    /// A caller event reused a condition name or the finalize event name
    #[error("Event name '{0}' is reserved")]
    ReservedEventName(String),

    /// A condition has nothing to check (no fields, or no members)
    #[error("Condition '{0}' is empty")]
    EmptyCondition(String),

    /// Invalid tracker configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
