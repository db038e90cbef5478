//! Summary of a finished stream

use fastlane_domain::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Event name recorded when a stream is finalized
pub const STREAM_FINALIZED_EVENT: &str = "stream_finalized";

/// First trigger time of one condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionTrigger {
    /// Index in the tracker's condition list
    pub index: usize,

    /// Condition name
    pub name: String,

    /// Whether this is a required-fields condition
    pub required_style: bool,

    /// Elapsed seconds at first trigger; None if it never triggered
    pub first_triggered_secs: Option<f64>,
}

/// Immutable record produced once per stream by `finalize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Stream this summary describes
    pub stream_id: StreamId,

    /// Seconds from stream start to finalize
    pub total_elapsed_secs: f64,

    /// Snapshots ingested, including an applied terminal response
    pub snapshot_count: usize,

    /// Whether a terminal response was ingested by finalize
    pub terminal_applied: bool,

    /// Event name → elapsed seconds
    pub event_timestamps: BTreeMap<String, f64>,

    /// One entry per configured condition, in declaration order
    pub condition_triggers: Vec<ConditionTrigger>,
}

impl Summary {
    /// First trigger time of the condition called `name`
    pub fn trigger_secs(&self, name: &str) -> Option<f64> {
        self.condition_triggers
            .iter()
            .find(|t| t.name == name)
            .and_then(|t| t.first_triggered_secs)
    }

    /// Earliest trigger time among required-fields conditions
    pub fn required_ready_secs(&self) -> Option<f64> {
        self.condition_triggers
            .iter()
            .filter(|t| t.required_style)
            .filter_map(|t| t.first_triggered_secs)
            .reduce(f64::min)
    }

    /// Share of total stream time saved by acting on required fields
    ///
    /// `(total - required_ready) / total * 100`. None when no required
    /// condition fired or the stream took no measurable time.
    ///
    /// # Examples
    ///
    /// ```
    /// use fastlane_domain::StreamId;
    /// use fastlane_tracker::{ConditionTrigger, Summary};
    /// use std::collections::BTreeMap;
    ///
    /// let summary = Summary {
    ///     stream_id: StreamId::new(),
    ///     total_elapsed_secs: 10.0,
    ///     snapshot_count: 5,
    ///     terminal_applied: false,
    ///     event_timestamps: BTreeMap::new(),
    ///     condition_triggers: vec![ConditionTrigger {
    ///         index: 0,
    ///         name: "required_ready".to_string(),
    ///         required_style: true,
    ///         first_triggered_secs: Some(4.0),
    ///     }],
    /// };
    /// assert_eq!(summary.time_savings_percent(), Some(60.0));
    /// ```
    pub fn time_savings_percent(&self) -> Option<f64> {
        let required = self.required_ready_secs()?;
        let total = self.total_elapsed_secs;
        if total <= 0.0 {
            return None;
        }
        Some((total - required) * 100.0 / total)
    }

    /// Number of conditions that triggered
    pub fn triggered_count(&self) -> usize {
        self.condition_triggers
            .iter()
            .filter(|t| t.first_triggered_secs.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(total: f64, triggers: Vec<(bool, Option<f64>)>) -> Summary {
        Summary {
            stream_id: StreamId::from_value(1),
            total_elapsed_secs: total,
            snapshot_count: 3,
            terminal_applied: false,
            event_timestamps: BTreeMap::new(),
            condition_triggers: triggers
                .into_iter()
                .enumerate()
                .map(|(index, (required_style, first))| ConditionTrigger {
                    index,
                    name: format!("c{}", index),
                    required_style,
                    first_triggered_secs: first,
                })
                .collect(),
        }
    }

    #[test]
    fn test_savings_percent() {
        let s = summary(10.0, vec![(true, Some(4.0)), (false, Some(10.0))]);
        assert_eq!(s.time_savings_percent(), Some(60.0));
    }

    #[test]
    fn test_savings_undefined_without_required_trigger() {
        let s = summary(10.0, vec![(true, None), (false, Some(9.0))]);
        assert_eq!(s.required_ready_secs(), None);
        assert_eq!(s.time_savings_percent(), None);
    }

    #[test]
    fn test_savings_undefined_for_zero_total() {
        let s = summary(0.0, vec![(true, Some(0.0))]);
        assert_eq!(s.time_savings_percent(), None);
    }

    #[test]
    fn test_earliest_required_condition_wins() {
        let s = summary(8.0, vec![(true, Some(6.0)), (true, Some(2.0))]);
        assert_eq!(s.required_ready_secs(), Some(2.0));
        assert_eq!(s.time_savings_percent(), Some(75.0));
    }

    #[test]
    fn test_trigger_lookup_by_name() {
        let s = summary(5.0, vec![(true, Some(1.0)), (false, None)]);
        assert_eq!(s.trigger_secs("c0"), Some(1.0));
        assert_eq!(s.trigger_secs("c1"), None);
        assert_eq!(s.trigger_secs("missing"), None);
        assert_eq!(s.triggered_count(), 1);
    }

    #[test]
    fn test_serializes_to_json() {
        let s = summary(5.0, vec![(true, Some(1.0))]);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["total_elapsed_secs"], 5.0);
        assert_eq!(json["condition_triggers"][0]["first_triggered_secs"], 1.0);
    }
}
