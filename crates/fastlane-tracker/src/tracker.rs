//! Core tracker implementation

use crate::condition::CompletionCondition;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::summary::{ConditionTrigger, Summary, STREAM_FINALIZED_EVENT};
use crate::timer::{Clock, StreamTimer, SystemClock};
use fastlane_domain::{ExtractionError, FieldExtractor, FieldState, SnapshotFieldMap, StreamId};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of ingesting one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// 1-based position of the snapshot in the stream
    pub snapshot_index: usize,

    /// Elapsed stream time at ingestion
    pub elapsed: Duration,

    /// Field map built from the snapshot
    pub fields: SnapshotFieldMap,

    /// Conditions that became satisfied with this snapshot, in declaration order
    pub triggered: Vec<usize>,
}

impl IngestOutcome {
    /// Whether any condition triggered
    pub fn has_triggered(&self) -> bool {
        !self.triggered.is_empty()
    }
}

/// Turns a sequence of partial snapshots into "newly triggered" events
///
/// Each condition is reported at most once per stream. The tracker is single
/// writer: `ingest` calls must be made one at a time, in stream order.
///
/// # Examples
///
/// ```
/// use fastlane_domain::PresenceExtractor;
/// use fastlane_tracker::{FieldCompletionTracker, TrackerConfig};
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TrackerConfig::from_fields(["name", "email", "bio"], ["name", "email"]);
/// let conditions = config.default_conditions();
/// let mut tracker = FieldCompletionTracker::new(&config, conditions, PresenceExtractor)?;
///
/// assert!(tracker.ingest(&json!({"name": "Ada"}))?.triggered.is_empty());
/// assert_eq!(tracker.ingest(&json!({"name": "Ada", "email": "ada@example.com"}))?.triggered, vec![0]);
///
/// let summary = tracker.finalize(Some(&json!({
///     "name": "Ada", "email": "ada@example.com", "bio": "Mathematician"
/// })))?;
/// assert_eq!(summary.triggered_count(), 2);
/// # Ok(())
/// # }
/// ```
pub struct FieldCompletionTracker<E: FieldExtractor> {
    fields: Vec<String>,
    conditions: Vec<CompletionCondition>,
    extractor: E,
    timer: StreamTimer,
    stream_id: StreamId,
    triggered: BTreeSet<usize>,
    first_triggered: Vec<Option<Duration>>,
    snapshot_count: usize,
    terminal_applied: bool,
    summary: Option<Summary>,
}

impl<E: FieldExtractor> FieldCompletionTracker<E> {
    /// Create a tracker timed by the system clock
    pub fn new(
        config: &TrackerConfig,
        conditions: Vec<CompletionCondition>,
        extractor: E,
    ) -> Result<Self, TrackerError> {
        Self::with_clock(config, conditions, extractor, Arc::new(SystemClock::new()))
    }

    /// Create a tracker timed by `clock`
    pub fn with_clock(
        config: &TrackerConfig,
        conditions: Vec<CompletionCondition>,
        extractor: E,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TrackerError> {
        config.validate().map_err(TrackerError::Config)?;
        check_conditions(config, &conditions)?;

        let fields: Vec<String> = config.fields.iter().map(|f| f.name.clone()).collect();
        let stream_id = StreamId::new();

        debug!(
            "Tracker {} created: {} fields, {} conditions",
            stream_id,
            fields.len(),
            conditions.len()
        );

        Ok(Self {
            first_triggered: vec![None; conditions.len()],
            fields,
            conditions,
            extractor,
            timer: StreamTimer::new(clock),
            stream_id,
            triggered: BTreeSet::new(),
            snapshot_count: 0,
            terminal_applied: false,
            summary: None,
        })
    }

    /// Ingest one partial snapshot
    ///
    /// Builds the snapshot's field map, evaluates every not-yet-triggered
    /// condition in declaration order and returns those that became
    /// satisfied. Extraction errors propagate and leave the tracker
    /// untouched (the snapshot is not counted).
    pub fn ingest(&mut self, snapshot: &E::Snapshot) -> Result<IngestOutcome, TrackerError> {
        if self.summary.is_some() {
            return Err(TrackerError::AlreadyFinalized);
        }
        self.apply(snapshot)
    }

    /// Finish the stream and produce its [`Summary`]
    ///
    /// A terminal response, when given, is ingested first so conditions that
    /// only hold on the authoritative result still fire. Calling `finalize`
    /// again returns the same summary without re-ingesting or re-timing.
    pub fn finalize(&mut self, terminal: Option<&E::Snapshot>) -> Result<Summary, TrackerError> {
        self.finalize_with_outcome(terminal).map(|(summary, _)| summary)
    }

    /// Like [`finalize`](Self::finalize), also returning the outcome of
    /// ingesting the terminal response
    ///
    /// The outcome is `None` when no terminal response was given or the
    /// tracker was already finalized.
    pub fn finalize_with_outcome(
        &mut self,
        terminal: Option<&E::Snapshot>,
    ) -> Result<(Summary, Option<IngestOutcome>), TrackerError> {
        if let Some(summary) = &self.summary {
            return Ok((summary.clone(), None));
        }

        let outcome = match terminal {
            Some(terminal) => {
                let outcome = self.apply(terminal)?;
                self.terminal_applied = true;
                if outcome.has_triggered() {
                    debug!(
                        "Stream {}: terminal response triggered {} condition(s)",
                        self.stream_id,
                        outcome.triggered.len()
                    );
                }
                Some(outcome)
            }
            None if self.snapshot_count == 0 => return Err(TrackerError::NothingIngested),
            None => None,
        };

        let total = self.timer.mark_event(STREAM_FINALIZED_EVENT);
        let summary = self.build_summary(total);

        info!(
            "Stream {} finalized in {:.3}s: {} snapshots, {}/{} conditions triggered",
            self.stream_id,
            summary.total_elapsed_secs,
            summary.snapshot_count,
            summary.triggered_count(),
            self.conditions.len()
        );
        if let Some(savings) = summary.time_savings_percent() {
            info!("Stream {}: required fields ready {:.1}% ahead of completion", self.stream_id, savings);
        }

        self.summary = Some(summary.clone());
        Ok((summary, outcome))
    }

    /// Clear all per-stream state so the tracker can consume a new stream
    ///
    /// Conditions, fields and extractor are kept. A fresh stream id is issued
    /// and the timer restarts.
    pub fn reset(&mut self) {
        self.triggered.clear();
        self.first_triggered = vec![None; self.conditions.len()];
        self.snapshot_count = 0;
        self.terminal_applied = false;
        self.summary = None;
        self.timer.reset();
        self.stream_id = StreamId::new();
        debug!("Tracker reset, new stream {}", self.stream_id);
    }

    /// Record a named event on the stream timer
    ///
    /// Condition names and [`STREAM_FINALIZED_EVENT`] belong to the tracker
    /// and are rejected.
    pub fn mark_event(&mut self, name: impl Into<String>) -> Result<Duration, TrackerError> {
        if self.summary.is_some() {
            return Err(TrackerError::AlreadyFinalized);
        }
        let name = name.into();
        if name == STREAM_FINALIZED_EVENT || self.condition_index(&name).is_some() {
            return Err(TrackerError::ReservedEventName(name));
        }
        Ok(self.timer.mark_event(name))
    }

    /// Identifier of the current stream
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Configured conditions, in declaration order
    pub fn conditions(&self) -> &[CompletionCondition] {
        &self.conditions
    }

    /// Index of the condition called `name`
    pub fn condition_index(&self, name: &str) -> Option<usize> {
        self.conditions.iter().position(|c| c.name() == name)
    }

    /// Configured field names, in declaration order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether the condition at `index` has triggered
    pub fn is_triggered(&self, index: usize) -> bool {
        self.triggered.contains(&index)
    }

    /// Indices of all triggered conditions, ascending
    pub fn triggered(&self) -> Vec<usize> {
        self.triggered.iter().copied().collect()
    }

    /// Whether any required-fields condition has triggered
    pub fn required_ready(&self) -> bool {
        self.triggered
            .iter()
            .any(|&i| self.conditions[i].is_required_style())
    }

    /// Snapshots ingested so far
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    /// Whether `finalize` has produced a summary
    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    /// Time since the stream started
    pub fn elapsed(&self) -> Duration {
        self.timer.elapsed()
    }

    /// The stream timer
    pub fn timer(&self) -> &StreamTimer {
        &self.timer
    }

    fn apply(&mut self, snapshot: &E::Snapshot) -> Result<IngestOutcome, TrackerError> {
        let elapsed = self.timer.elapsed();
        let fields = self.build_field_map(snapshot, elapsed)?;
        self.snapshot_count += 1;

        let mut newly = Vec::new();
        for (index, condition) in self.conditions.iter().enumerate() {
            if self.triggered.contains(&index) || !condition.is_satisfied(&fields) {
                continue;
            }
            self.triggered.insert(index);
            self.first_triggered[index] = Some(elapsed);
            self.timer.mark_event(condition.name());
            info!(
                "Stream {}: condition '{}' triggered at {:.3}s (snapshot #{})",
                self.stream_id,
                condition.name(),
                elapsed.as_secs_f64(),
                self.snapshot_count
            );
            newly.push(index);
        }

        debug!(
            "Stream {}: snapshot #{} at {:.3}s, {}/{} fields complete",
            self.stream_id,
            self.snapshot_count,
            elapsed.as_secs_f64(),
            fields.complete_count(),
            fields.len()
        );

        Ok(IngestOutcome {
            snapshot_index: self.snapshot_count,
            elapsed,
            fields,
            triggered: newly,
        })
    }

    fn build_field_map(
        &self,
        snapshot: &E::Snapshot,
        observed_at: Duration,
    ) -> Result<SnapshotFieldMap, ExtractionError> {
        self.fields
            .iter()
            .map(|name| -> Result<FieldState, ExtractionError> {
                let reading = self.extractor.extract(snapshot, name)?;
                Ok(FieldState::from_reading(name.as_str(), reading, observed_at))
            })
            .collect()
    }

    fn build_summary(&self, total: Duration) -> Summary {
        let condition_triggers = self
            .conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| ConditionTrigger {
                index,
                name: condition.name().to_string(),
                required_style: condition.is_required_style(),
                first_triggered_secs: self.first_triggered[index].map(|d| d.as_secs_f64()),
            })
            .collect();

        Summary {
            stream_id: self.stream_id,
            total_elapsed_secs: total.as_secs_f64(),
            snapshot_count: self.snapshot_count,
            terminal_applied: self.terminal_applied,
            event_timestamps: self
                .timer
                .events()
                .iter()
                .map(|(name, at)| (name.clone(), at.as_secs_f64()))
                .collect(),
            condition_triggers,
        }
    }
}

fn check_conditions(
    config: &TrackerConfig,
    conditions: &[CompletionCondition],
) -> Result<(), TrackerError> {
    let mut names = HashSet::new();
    for condition in conditions {
        let name = condition.name();
        if name.trim().is_empty() {
            return Err(TrackerError::Config("condition names must not be empty".to_string()));
        }
        if name == STREAM_FINALIZED_EVENT {
            return Err(TrackerError::Config(format!(
                "'{}' is reserved for the finalize event",
                STREAM_FINALIZED_EVENT
            )));
        }
        if !names.insert(name) {
            return Err(TrackerError::DuplicateConditionName(name.to_string()));
        }
        if condition.is_empty() {
            return Err(TrackerError::EmptyCondition(name.to_string()));
        }
        for field in condition.referenced_fields() {
            if config.field(field).is_none() {
                warn!(
                    "Condition '{}' refers to unconfigured field '{}'; it will never be complete",
                    name, field
                );
            }
        }
    }
    Ok(())
}

impl<E: FieldExtractor> std::fmt::Debug for FieldCompletionTracker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCompletionTracker")
            .field("stream_id", &self.stream_id)
            .field("fields", &self.fields)
            .field("conditions", &self.conditions)
            .field("triggered", &self.triggered)
            .field("snapshot_count", &self.snapshot_count)
            .field("finalized", &self.summary.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;
    use fastlane_domain::PresenceExtractor;
    use serde_json::json;

    fn tracker(
        fields: &[&str],
        required: &[&str],
    ) -> (FieldCompletionTracker<PresenceExtractor>, ManualClock) {
        let config = TrackerConfig::from_fields(fields.iter().copied(), required.iter().copied());
        let clock = ManualClock::new();
        let tracker = FieldCompletionTracker::with_clock(
            &config,
            config.default_conditions(),
            PresenceExtractor,
            Arc::new(clock.clone()),
        )
        .unwrap();
        (tracker, clock)
    }

    #[test]
    fn test_field_map_has_every_configured_field() {
        let (mut tracker, _) = tracker(&["name", "email", "age"], &["name"]);
        let outcome = tracker.ingest(&json!({"name": "Ada", "extra": 1})).unwrap();
        assert_eq!(outcome.fields.len(), 3);
        assert!(outcome.fields.get("extra").is_none());
        assert!(!outcome.fields.is_complete("email"));
    }

    #[test]
    fn test_ingest_counts_snapshots() {
        let (mut tracker, _) = tracker(&["name"], &["name"]);
        tracker.ingest(&json!({})).unwrap();
        let outcome = tracker.ingest(&json!({})).unwrap();
        assert_eq!(outcome.snapshot_index, 2);
        assert_eq!(tracker.snapshot_count(), 2);
    }

    #[test]
    fn test_extraction_error_propagates_and_is_not_counted() {
        let (mut tracker, _) = tracker(&["name"], &["name"]);
        let err = tracker.ingest(&json!("oops")).unwrap_err();
        assert!(matches!(err, TrackerError::Extraction(ExtractionError::NotAnObject(_))));
        assert_eq!(tracker.snapshot_count(), 0);
    }

    #[test]
    fn test_ingest_after_finalize_is_rejected() {
        let (mut tracker, _) = tracker(&["name"], &["name"]);
        tracker.ingest(&json!({"name": "Ada"})).unwrap();
        tracker.finalize(None).unwrap();
        assert_eq!(tracker.ingest(&json!({})).unwrap_err(), TrackerError::AlreadyFinalized);
        assert_eq!(tracker.mark_event("late").unwrap_err(), TrackerError::AlreadyFinalized);
    }

    #[test]
    fn test_finalize_before_ingest_is_rejected() {
        let (mut tracker, _) = tracker(&["name"], &["name"]);
        assert_eq!(tracker.finalize(None).unwrap_err(), TrackerError::NothingIngested);
    }

    #[test]
    fn test_finalize_with_only_terminal_is_allowed() {
        let (mut tracker, _) = tracker(&["name"], &["name"]);
        let summary = tracker.finalize(Some(&json!({"name": "Ada"}))).unwrap();
        assert_eq!(summary.snapshot_count, 1);
        assert!(summary.terminal_applied);
        assert_eq!(summary.triggered_count(), 2);
    }

    #[test]
    fn test_failed_terminal_leaves_tracker_open() {
        let (mut tracker, _) = tracker(&["name"], &["name"]);
        tracker.ingest(&json!({})).unwrap();
        assert!(tracker.finalize(Some(&json!(null))).is_err());
        assert!(!tracker.is_finalized());
        let summary = tracker.finalize(None).unwrap();
        assert!(!summary.terminal_applied);
    }

    #[test]
    fn test_finalize_with_outcome_exposes_terminal_fields() {
        let (mut tracker, _) = tracker(&["name", "bio"], &["name"]);
        tracker.ingest(&json!({"name": "Ada"})).unwrap();
        let (summary, outcome) = tracker
            .finalize_with_outcome(Some(&json!({"name": "Ada", "bio": "Mathematician"})))
            .unwrap();
        let outcome = outcome.unwrap();
        assert_eq!(outcome.triggered, vec![1]);
        assert!(outcome.fields.all_complete());
        assert_eq!(summary.snapshot_count, 2);

        let (_, again) = tracker.finalize_with_outcome(None).unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn test_reset_clears_state_but_keeps_conditions() {
        let (mut tracker, clock) = tracker(&["name"], &["name"]);
        let first_id = tracker.stream_id();
        clock.advance(Duration::from_secs(2));
        tracker.ingest(&json!({"name": "Ada"})).unwrap();
        tracker.finalize(None).unwrap();

        tracker.reset();
        assert_ne!(tracker.stream_id(), first_id);
        assert_eq!(tracker.snapshot_count(), 0);
        assert!(tracker.triggered().is_empty());
        assert!(!tracker.is_finalized());
        assert_eq!(tracker.conditions().len(), 2);
        assert_eq!(tracker.elapsed(), Duration::ZERO);

        // Conditions can fire again on the new stream
        let outcome = tracker.ingest(&json!({"name": "Grace"})).unwrap();
        assert_eq!(outcome.triggered, vec![0, 1]);
    }

    #[test]
    fn test_duplicate_condition_names_rejected() {
        let config = TrackerConfig::from_fields(["a"], ["a"]);
        let result = FieldCompletionTracker::new(
            &config,
            vec![
                CompletionCondition::all_fields("done"),
                CompletionCondition::required("done", ["a"]),
            ],
            PresenceExtractor,
        );
        assert_eq!(result.unwrap_err(), TrackerError::DuplicateConditionName("done".to_string()));
    }

    #[test]
    fn test_reserved_and_empty_conditions_rejected() {
        let config = TrackerConfig::from_fields(["a"], ["a"]);
        let reserved = FieldCompletionTracker::new(
            &config,
            vec![CompletionCondition::all_fields(STREAM_FINALIZED_EVENT)],
            PresenceExtractor,
        );
        assert!(matches!(reserved.unwrap_err(), TrackerError::Config(_)));

        let empty = FieldCompletionTracker::new(
            &config,
            vec![CompletionCondition::all_of("nothing", Vec::new())],
            PresenceExtractor,
        );
        assert_eq!(empty.unwrap_err(), TrackerError::EmptyCondition("nothing".to_string()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = FieldCompletionTracker::new(&TrackerConfig::default(), Vec::new(), PresenceExtractor);
        assert!(matches!(result.unwrap_err(), TrackerError::Config(_)));
    }

    #[test]
    fn test_mark_event_rejects_reserved_names() {
        let (mut tracker, clock) = tracker(&["name", "bio"], &["name"]);
        clock.set_secs(1.0);
        tracker.ingest(&json!({"name": "Ada"})).unwrap();

        clock.set_secs(3.0);
        assert_eq!(
            tracker.mark_event("required_ready").unwrap_err(),
            TrackerError::ReservedEventName("required_ready".to_string())
        );
        assert_eq!(
            tracker.mark_event("all_complete").unwrap_err(),
            TrackerError::ReservedEventName("all_complete".to_string())
        );
        assert_eq!(
            tracker.mark_event(STREAM_FINALIZED_EVENT).unwrap_err(),
            TrackerError::ReservedEventName(STREAM_FINALIZED_EVENT.to_string())
        );
        assert_eq!(tracker.mark_event("next_job_started").unwrap(), Duration::from_secs(3));

        clock.set_secs(4.0);
        let summary = tracker.finalize(None).unwrap();
        assert_eq!(summary.trigger_secs("required_ready"), Some(1.0));
        assert_eq!(summary.event_timestamps.get("required_ready"), Some(&1.0));
        assert_eq!(summary.event_timestamps.get("next_job_started"), Some(&3.0));
    }

    #[test]
    fn test_shape_error_from_custom_extractor_propagates() {
        use fastlane_domain::{FieldReading, FnExtractor};
        use serde_json::Value;

        let extractor = FnExtractor::new(|snapshot: &Value, field: &str| match snapshot.get(field) {
            None => Ok(FieldReading::absent()),
            Some(Value::Number(n)) => Ok(FieldReading::complete(Value::Number(n.clone()))),
            Some(_) => Err(ExtractionError::shape(field, "expected a number")),
        });
        let config = TrackerConfig::from_fields(["age"], ["age"]);
        let mut tracker =
            FieldCompletionTracker::new(&config, config.default_conditions(), extractor).unwrap();

        let err = tracker.ingest(&json!({"age": "twenty"})).unwrap_err();
        assert_eq!(
            err,
            TrackerError::Extraction(ExtractionError::Shape {
                field: "age".to_string(),
                reason: "expected a number".to_string(),
            })
        );
        assert_eq!(err.to_string(), "Extraction error: Unexpected shape for field 'age': expected a number");
        assert_eq!(tracker.snapshot_count(), 0);

        assert_eq!(tracker.ingest(&json!({"age": 36})).unwrap().triggered, vec![0, 1]);
    }

    #[test]
    fn test_condition_lookup_and_required_ready() {
        let (mut tracker, _) = tracker(&["name", "bio"], &["name"]);
        assert_eq!(tracker.condition_index("all_complete"), Some(1));
        assert_eq!(tracker.condition_index("missing"), None);
        assert!(!tracker.required_ready());
        tracker.ingest(&json!({"name": "Ada"})).unwrap();
        assert!(tracker.required_ready());
        assert!(tracker.is_triggered(0));
        assert!(!tracker.is_triggered(1));
    }
}
