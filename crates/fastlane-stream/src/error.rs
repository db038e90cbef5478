//! Error types for stream consumption

use fastlane_tracker::TrackerError;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a stream run
///
/// Handler failures are not here: they are reported, never propagated.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Tracker misuse or an extraction error under the abort policy
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// The upstream source failed mid-stream or while producing its final response
    #[error("Source error: {0:#}")]
    Source(anyhow::Error),

    /// No required-fields condition triggered before the configured deadline
    #[error("Required fields not ready after {waited:?}")]
    RequiredFieldsTimeout {
        /// How long the processor waited
        waited: Duration,
    },

    /// A handler was registered for a condition the tracker does not have
    #[error("Unknown handler target: {0}")]
    UnknownHandlerTarget(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
