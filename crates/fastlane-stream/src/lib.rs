//! Fastlane Stream
//!
//! Async consumption of partial-snapshot streams with fire-and-forget
//! condition handlers.
//!
//! # Overview
//!
//! [`StreamProcessor`] pulls snapshots from a [`SnapshotSource`], feeds them
//! to a `FieldCompletionTracker` and, whenever a condition first holds,
//! spawns the handler registered for it. Consumption never waits on a
//! handler: downstream work on the required fields overlaps with the rest
//! of the stream.
//!
//! ```text
//! SnapshotSource ──► StreamProcessor ──► FieldCompletionTracker
//!                         │   │
//!                         │   └──► Dispatcher (JoinSet) ──► handlers
//!                         └──► watch::Receiver<StreamUpdate>
//! ```
//!
//! # Failure Handling
//!
//! - A source error ends the run with [`StreamError::Source`]; the tracker is
//!   left un-finalized so the caller can still summarize what arrived.
//! - Malformed snapshots abort or are skipped per [`MalformedSnapshotPolicy`].
//! - Handler errors and panics are reported in [`HandlerReport`]s and never
//!   fail the run.

#![warn(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod processor;
pub mod source;

pub use config::{FastlaneConfig, MalformedSnapshotPolicy, ProcessorConfig};
pub use dispatch::{Dispatcher, HandlerOutcome, HandlerReport};
pub use error::StreamError;
pub use handler::{handler, Handler, HandlerContext, HandlerFuture, HandlerRegistry};
pub use processor::{StreamProcessor, StreamReport, StreamUpdate};
pub use source::{ChannelSource, ScriptStep, SnapshotSource, ScriptedSource};
