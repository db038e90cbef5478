//! Configuration for stream processing
//!
//! A full configuration file combines the tracked fields and the processor
//! policy:
//!
//! ```toml
//! [tracker]
//! [[tracker.fields]]
//! name = "name"
//! required = true
//!
//! [[tracker.fields]]
//! name = "bio"
//!
//! [processor]
//! required_fields_timeout_secs = 30
//! on_malformed_snapshot = "skip"
//! await_handlers = true
//! handler_drain_timeout_secs = 30
//! ```

use crate::error::StreamError;
use fastlane_tracker::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// What to do with a snapshot whose fields cannot be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedSnapshotPolicy {
    /// Stop consuming and return the extraction error
    #[default]
    Abort,
    /// Log the error and continue with the next snapshot
    Skip,
}

/// Caller-side policy for consuming a snapshot stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Give up if no required-fields condition has triggered after this
    /// many seconds. None waits for as long as the source keeps producing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_fields_timeout_secs: Option<u64>,

    /// Handling of snapshots the extractor rejects
    #[serde(default)]
    pub on_malformed_snapshot: MalformedSnapshotPolicy,

    /// Wait for in-flight handlers after finalize
    /// Default: true
    #[serde(default = "default_await_handlers")]
    pub await_handlers: bool,

    /// Upper bound on waiting for handlers after finalize; stragglers are aborted
    /// Default: 30 seconds
    #[serde(default = "default_handler_drain_timeout_secs")]
    pub handler_drain_timeout_secs: u64,
}

fn default_await_handlers() -> bool {
    true
}

fn default_handler_drain_timeout_secs() -> u64 {
    30
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            required_fields_timeout_secs: None,
            on_malformed_snapshot: MalformedSnapshotPolicy::Abort,
            await_handlers: true,
            handler_drain_timeout_secs: 30,
        }
    }
}

impl ProcessorConfig {
    /// Strict preset: bounded wait for required fields, abort on bad snapshots
    pub fn strict() -> Self {
        Self {
            required_fields_timeout_secs: Some(30),
            on_malformed_snapshot: MalformedSnapshotPolicy::Abort,
            await_handlers: true,
            handler_drain_timeout_secs: 10,
        }
    }

    /// Lenient preset: no deadline, skip bad snapshots, generous handler drain
    pub fn lenient() -> Self {
        Self {
            required_fields_timeout_secs: None,
            on_malformed_snapshot: MalformedSnapshotPolicy::Skip,
            await_handlers: true,
            handler_drain_timeout_secs: 120,
        }
    }

    /// Required-fields deadline as a Duration
    pub fn required_fields_timeout(&self) -> Option<Duration> {
        self.required_fields_timeout_secs.map(Duration::from_secs)
    }

    /// Handler drain timeout as a Duration
    pub fn handler_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_drain_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.required_fields_timeout_secs == Some(0) {
            return Err("required_fields_timeout_secs must be greater than 0".to_string());
        }
        if self.handler_drain_timeout_secs == 0 {
            return Err("handler_drain_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

/// Tracker fields plus processor policy, as read from one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastlaneConfig {
    /// Tracked fields
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Consumption policy
    #[serde(default)]
    pub processor: ProcessorConfig,
}

impl FastlaneConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(toml_str: &str) -> Result<Self, StreamError> {
        let config: FastlaneConfig = toml::from_str(toml_str)
            .map_err(|e| StreamError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| StreamError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<(), StreamError> {
        self.tracker.validate().map_err(StreamError::Config)?;
        self.processor.validate().map_err(StreamError::Config)
    }
}
