//! Trait definitions for external interactions
//!
//! The extraction framework's partial objects are opaque to Fastlane. A
//! `FieldExtractor` is the only code that knows their shape.

use crate::{ExtractionError, FieldReading};
use std::fmt;
use std::marker::PhantomData;

/// Reads one declared field off a partial snapshot
///
/// Implemented by callers for their framework's object shape. JSON
/// snapshots are covered by [`crate::PresenceExtractor`] and
/// [`crate::StreamStateExtractor`].
pub trait FieldExtractor {
    /// The partial object type produced by the upstream stream
    type Snapshot: ?Sized;

    /// Read the presence, value and status of `field` from `snapshot`
    fn extract(&self, snapshot: &Self::Snapshot, field: &str) -> Result<FieldReading, ExtractionError>;
}

/// Adapts a closure into a [`FieldExtractor`]
///
/// # Examples
///
/// ```
/// use fastlane_domain::{FieldExtractor, FieldReading, FnExtractor};
/// use std::collections::HashMap;
///
/// let extractor = FnExtractor::new(|snapshot: &HashMap<String, String>, field: &str| {
///     Ok(match snapshot.get(field) {
///         Some(v) => FieldReading::complete(v.clone().into()),
///         None => FieldReading::absent(),
///     })
/// });
///
/// let mut snapshot = HashMap::new();
/// snapshot.insert("name".to_string(), "Ada".to_string());
/// assert!(extractor.extract(&snapshot, "name").unwrap().status.is_complete());
/// ```
pub struct FnExtractor<S: ?Sized, F> {
    extract: F,
    _snapshot: PhantomData<fn(&S)>,
}

impl<S: ?Sized, F> FnExtractor<S, F>
where
    F: Fn(&S, &str) -> Result<FieldReading, ExtractionError>,
{
    /// Wrap a closure
    pub fn new(extract: F) -> Self {
        Self {
            extract,
            _snapshot: PhantomData,
        }
    }
}

impl<S: ?Sized, F> FieldExtractor for FnExtractor<S, F>
where
    F: Fn(&S, &str) -> Result<FieldReading, ExtractionError>,
{
    type Snapshot = S;

    fn extract(&self, snapshot: &S, field: &str) -> Result<FieldReading, ExtractionError> {
        (self.extract)(snapshot, field)
    }
}

impl<S: ?Sized, F> fmt::Debug for FnExtractor<S, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExtractor").finish_non_exhaustive()
    }
}
