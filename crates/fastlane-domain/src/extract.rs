//! Field extractors for JSON partial snapshots
//!
//! Structured-extraction clients commonly hand out partial results that
//! serialize to a JSON object whose fields fill in over time. Two shapes
//! are supported:
//!
//! - plain values, where presence means complete
//! - stream-state wrappers `{"value": ..., "state": "Pending" | "Incomplete" | "Complete"}`

use crate::{ExtractionError, FieldExtractor, FieldReading};
use serde_json::{Map, Value};

/// Binary extractor: a missing or `null` field is absent, anything else complete
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceExtractor;

impl FieldExtractor for PresenceExtractor {
    type Snapshot = Value;

    fn extract(&self, snapshot: &Value, field: &str) -> Result<FieldReading, ExtractionError> {
        let obj = as_object(snapshot)?;
        Ok(match obj.get(field) {
            None | Some(Value::Null) => FieldReading::absent(),
            Some(value) => FieldReading::complete(value.clone()),
        })
    }
}

/// Extractor that understands stream-state wrappers
///
/// A field whose value is an object with a string `state` and a `value`
/// key is read as a wrapper:
///
/// | state        | status        |
/// |--------------|---------------|
/// | `Pending`    | absent        |
/// | `Incomplete` | in progress   |
/// | `Complete`   | complete      |
///
/// Fields without wrapper metadata are complete on presence. That matches
/// what most partial results do, but it is an assumption about the upstream
/// framework rather than a guarantee it makes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamStateExtractor;

impl FieldExtractor for StreamStateExtractor {
    type Snapshot = Value;

    fn extract(&self, snapshot: &Value, field: &str) -> Result<FieldReading, ExtractionError> {
        let obj = as_object(snapshot)?;
        let raw = match obj.get(field) {
            None | Some(Value::Null) => return Ok(FieldReading::absent()),
            Some(raw) => raw,
        };

        let Some((state, inner)) = as_stream_state(raw) else {
            return Ok(FieldReading::complete(raw.clone()));
        };

        match state {
            "Pending" => Ok(FieldReading::absent()),
            "Incomplete" if inner.is_null() => Ok(FieldReading::absent()),
            "Incomplete" => Ok(FieldReading::in_progress(inner.clone())),
            "Complete" => Ok(FieldReading::complete(inner.clone())),
            other => Err(ExtractionError::UnknownStreamState {
                field: field.to_string(),
                state: other.to_string(),
            }),
        }
    }
}

fn as_object(snapshot: &Value) -> Result<&Map<String, Value>, ExtractionError> {
    snapshot
        .as_object()
        .ok_or_else(|| ExtractionError::NotAnObject(json_type_name(snapshot).to_string()))
}

/// Split a `{"state": .., "value": ..}` wrapper, if `raw` is one
fn as_stream_state(raw: &Value) -> Option<(&str, &Value)> {
    let obj = raw.as_object()?;
    let state = obj.get("state")?.as_str()?;
    let inner = obj.get("value")?;
    Some((state, inner))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
