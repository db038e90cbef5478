//! Field module - per-snapshot view of each configured field

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Completion status of a single field in one snapshot
///
/// Upstream sources only ever move a field forward:
/// `Absent` → `InProgress` → `Complete`. Only `Complete` counts toward
/// completion conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// The field has not appeared yet
    Absent,

    /// The field is present but its value is still growing
    InProgress,

    /// The field is finalized
    Complete,
}

impl FieldStatus {
    /// Whether this status counts as complete
    pub fn is_complete(&self) -> bool {
        matches!(self, FieldStatus::Complete)
    }

    /// Get the status name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Absent => "absent",
            FieldStatus::InProgress => "in_progress",
            FieldStatus::Complete => "complete",
        }
    }
}

/// What an extractor read for one field of one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReading {
    /// Current value, if any is visible
    pub value: Option<Value>,

    /// Completion status
    pub status: FieldStatus,
}

impl FieldReading {
    /// The field has not appeared
    pub fn absent() -> Self {
        Self {
            value: None,
            status: FieldStatus::Absent,
        }
    }

    /// The field is present but still growing
    pub fn in_progress(value: Value) -> Self {
        Self {
            value: Some(value),
            status: FieldStatus::InProgress,
        }
    }

    /// The field is finalized
    pub fn complete(value: Value) -> Self {
        Self {
            value: Some(value),
            status: FieldStatus::Complete,
        }
    }
}

/// Immutable state of one field as observed in one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    /// Configured field name
    pub name: String,

    /// Value visible in the snapshot (None when absent)
    pub value: Option<Value>,

    /// Completion status
    pub status: FieldStatus,

    /// Elapsed stream time at which the snapshot was ingested
    pub observed_at: Duration,
}

impl FieldState {
    /// Build a FieldState from an extractor reading
    pub fn from_reading(name: impl Into<String>, reading: FieldReading, observed_at: Duration) -> Self {
        Self {
            name: name.into(),
            value: reading.value,
            status: reading.status,
            observed_at,
        }
    }

    /// Whether the field is complete
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// Field name → FieldState for one snapshot
///
/// Holds exactly one entry per configured field, including fields that
/// have not appeared yet (status `Absent`). Built fresh for every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotFieldMap {
    fields: BTreeMap<String, FieldState>,
}

impl SnapshotFieldMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the state of a field
    pub fn insert(&mut self, state: FieldState) {
        self.fields.insert(state.name.clone(), state);
    }

    /// Get a field's state
    pub fn get(&self, name: &str) -> Option<&FieldState> {
        self.fields.get(name)
    }

    /// Get a field's status, if the field is known to this map
    pub fn status(&self, name: &str) -> Option<FieldStatus> {
        self.fields.get(name).map(|state| state.status)
    }

    /// Get a field's value, if present
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(|state| state.value.as_ref())
    }

    /// Whether the named field is complete; unknown fields are not complete
    pub fn is_complete(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(FieldState::is_complete)
    }

    /// Whether every field in the map is complete
    pub fn all_complete(&self) -> bool {
        self.fields.values().all(FieldState::is_complete)
    }

    /// Number of complete fields
    pub fn complete_count(&self) -> usize {
        self.fields.values().filter(|state| state.is_complete()).count()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the map has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over field states in name order
    pub fn iter(&self) -> impl Iterator<Item = &FieldState> {
        self.fields.values()
    }

    /// Iterate over field names in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FromIterator<FieldState> for SnapshotFieldMap {
    fn from_iter<I: IntoIterator<Item = FieldState>>(iter: I) -> Self {
        let mut map = SnapshotFieldMap::new();
        for state in iter {
            map.insert(state);
        }
        map
    }
}
