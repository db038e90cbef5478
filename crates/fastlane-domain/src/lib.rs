//! Fastlane Domain Layer
//!
//! Vocabulary shared by every Fastlane crate: what a field looks like at one
//! point of a streamed extraction, and the boundary trait used to read fields
//! off whatever partial object an extraction framework produces.
//!
//! ## Key Concepts
//!
//! - **Partial snapshot**: one incremental update of an in-progress structured result
//! - **FieldStatus**: absent, in progress, or complete
//! - **SnapshotFieldMap**: one `FieldState` per configured field, rebuilt per snapshot
//! - **FieldExtractor**: the single hook into a framework's object shape
//!
//! ## Architecture
//!
//! This crate holds no runtime and no timing logic. The tracker
//! (`fastlane-tracker`) and the async consumption loop (`fastlane-stream`)
//! build on the types defined here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod extract;
pub mod field;
pub mod stream_id;
pub mod traits;

// Re-exports for convenience
pub use error::ExtractionError;
pub use extract::{PresenceExtractor, StreamStateExtractor};
pub use field::{FieldReading, FieldState, FieldStatus, SnapshotFieldMap};
pub use stream_id::StreamId;
pub use traits::{FieldExtractor, FnExtractor};
