//! Fastlane Tracker
//!
//! Field-completion transition tracking for streamed structured extraction.
//!
//! # Overview
//!
//! A structured-extraction call that streams its result hands out a series
//! of partial objects, each a little more filled in than the last. Downstream
//! work often needs only a few of the fields. The tracker watches the
//! partials and reports, exactly once each, when configured boundary
//! conditions first hold: typically "the required fields are ready" and
//! later "every field is ready".
//!
//! # Architecture
//!
//! ```text
//! partial snapshots → FieldExtractor → SnapshotFieldMap → conditions → newly triggered
//!                                                                   ↘ StreamTimer → Summary
//! ```
//!
//! The tracker is synchronous and single writer. Dispatching handlers for
//! triggered conditions is the caller's job (see `fastlane-stream`).
//!
//! # Example Usage
//!
//! ```
//! use fastlane_domain::PresenceExtractor;
//! use fastlane_tracker::{CompletionCondition, FieldCompletionTracker, TrackerConfig};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackerConfig::from_fields(["name", "email", "age"], ["name", "email"]);
//! let mut conditions = config.default_conditions();
//! conditions.push(CompletionCondition::custom("adult", "age >= 21", |fields| {
//!     fields.value("age").and_then(|v| v.as_u64()).is_some_and(|age| age >= 21)
//! }));
//!
//! let mut tracker = FieldCompletionTracker::new(&config, conditions, PresenceExtractor)?;
//!
//! for partial in [json!({"name": "Ada"}), json!({"name": "Ada", "email": "ada@example.com"})] {
//!     for index in tracker.ingest(&partial)?.triggered {
//!         println!("triggered: {}", tracker.conditions()[index].describe());
//!     }
//! }
//!
//! let summary = tracker.finalize(None)?;
//! println!("{} snapshots in {:.3}s", summary.snapshot_count, summary.total_elapsed_secs);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod condition;
mod config;
mod error;
mod summary;
mod timer;
mod tracker;


pub use condition::{CompletionCondition, ConditionKind, FieldPredicate};
pub use config::{FieldSpec, TrackerConfig, ALL_COMPLETE, REQUIRED_READY};
pub use error::TrackerError;
pub use summary::{ConditionTrigger, Summary, STREAM_FINALIZED_EVENT};
pub use timer::{Clock, ManualClock, StreamTimer, SystemClock};
pub use tracker::{FieldCompletionTracker, IngestOutcome};
