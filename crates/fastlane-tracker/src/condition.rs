//! Completion conditions evaluated against each snapshot's field map

use fastlane_domain::SnapshotFieldMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Pure predicate over a snapshot's field map
pub type FieldPredicate = Arc<dyn Fn(&SnapshotFieldMap) -> bool + Send + Sync>;

/// A boundary condition the tracker reports the first time it holds
///
/// Conditions hold no state: satisfaction is recomputed from the current
/// map every time. The tracker stops evaluating a condition once it has
/// triggered.
#[derive(Clone)]
pub enum CompletionCondition {
    /// Every named field is complete. Names missing from the map count as
    /// not complete.
    RequiredFieldsComplete {
        /// Unique condition name
        name: String,
        /// Fields that must be complete
        fields: BTreeSet<String>,
    },

    /// Every configured field is complete
    AllFieldsComplete {
        /// Unique condition name
        name: String,
    },

    /// Caller-supplied predicate; must be pure and cheap enough to run on
    /// every snapshot
    Custom {
        /// Unique condition name
        name: String,
        /// Human readable description
        description: String,
        /// The predicate
        predicate: FieldPredicate,
    },

    /// Every member condition holds
    AllOf {
        /// Unique condition name
        name: String,
        /// Member conditions
        conditions: Vec<CompletionCondition>,
    },
}

/// Variant tag of a [`CompletionCondition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// [`CompletionCondition::RequiredFieldsComplete`]
    RequiredFields,
    /// [`CompletionCondition::AllFieldsComplete`]
    AllFields,
    /// [`CompletionCondition::Custom`]
    Custom,
    /// [`CompletionCondition::AllOf`]
    AllOf,
}

impl CompletionCondition {
    /// Condition satisfied once all `fields` are complete
    ///
    /// # Examples
    ///
    /// ```
    /// use fastlane_tracker::CompletionCondition;
    ///
    /// let condition = CompletionCondition::required("required_ready", ["name", "email"]);
    /// assert_eq!(condition.describe(), "required fields complete: email, name");
    /// ```
    pub fn required<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CompletionCondition::RequiredFieldsComplete {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Condition satisfied once every configured field is complete
    pub fn all_fields(name: impl Into<String>) -> Self {
        CompletionCondition::AllFieldsComplete { name: name.into() }
    }

    /// Condition backed by a caller predicate
    pub fn custom<F>(name: impl Into<String>, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SnapshotFieldMap) -> bool + Send + Sync + 'static,
    {
        CompletionCondition::Custom {
            name: name.into(),
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Conjunction of other conditions
    pub fn all_of(name: impl Into<String>, conditions: Vec<CompletionCondition>) -> Self {
        CompletionCondition::AllOf {
            name: name.into(),
            conditions,
        }
    }

    /// Unique name, also used as the timer event name when it triggers
    pub fn name(&self) -> &str {
        match self {
            CompletionCondition::RequiredFieldsComplete { name, .. }
            | CompletionCondition::AllFieldsComplete { name }
            | CompletionCondition::Custom { name, .. }
            | CompletionCondition::AllOf { name, .. } => name,
        }
    }

    /// Variant tag
    pub fn kind(&self) -> ConditionKind {
        match self {
            CompletionCondition::RequiredFieldsComplete { .. } => ConditionKind::RequiredFields,
            CompletionCondition::AllFieldsComplete { .. } => ConditionKind::AllFields,
            CompletionCondition::Custom { .. } => ConditionKind::Custom,
            CompletionCondition::AllOf { .. } => ConditionKind::AllOf,
        }
    }

    /// Whether this condition marks the "required fields ready" transition
    /// used for time-savings reporting
    pub fn is_required_style(&self) -> bool {
        self.kind() == ConditionKind::RequiredFields
    }

    /// Human readable description
    pub fn describe(&self) -> String {
        match self {
            CompletionCondition::RequiredFieldsComplete { fields, .. } => {
                let names: Vec<&str> = fields.iter().map(String::as_str).collect();
                format!("required fields complete: {}", names.join(", "))
            }
            CompletionCondition::AllFieldsComplete { .. } => "all fields complete".to_string(),
            CompletionCondition::Custom { description, .. } => description.clone(),
            CompletionCondition::AllOf { conditions, .. } => {
                let parts: Vec<String> = conditions.iter().map(|c| c.describe()).collect();
                format!("all of [{}]", parts.join("; "))
            }
        }
    }

    /// Evaluate against the current snapshot's field map
    pub fn is_satisfied(&self, fields: &SnapshotFieldMap) -> bool {
        match self {
            CompletionCondition::RequiredFieldsComplete { fields: required, .. } => {
                required.iter().all(|name| fields.is_complete(name))
            }
            CompletionCondition::AllFieldsComplete { .. } => fields.all_complete(),
            CompletionCondition::Custom { predicate, .. } => predicate(fields),
            CompletionCondition::AllOf { conditions, .. } => {
                conditions.iter().all(|c| c.is_satisfied(fields))
            }
        }
    }

    /// Whether the condition has nothing to check
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            CompletionCondition::RequiredFieldsComplete { fields, .. } => fields.is_empty(),
            CompletionCondition::AllOf { conditions, .. } => {
                conditions.is_empty() || conditions.iter().any(CompletionCondition::is_empty)
            }
            _ => false,
        }
    }

    /// Field names this condition refers to explicitly
    pub(crate) fn referenced_fields(&self) -> Vec<&str> {
        match self {
            CompletionCondition::RequiredFieldsComplete { fields, .. } => {
                fields.iter().map(String::as_str).collect()
            }
            CompletionCondition::AllOf { conditions, .. } => {
                conditions.iter().flat_map(|c| c.referenced_fields()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for CompletionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionCondition::RequiredFieldsComplete { name, fields } => f
                .debug_struct("RequiredFieldsComplete")
                .field("name", name)
                .field("fields", fields)
                .finish(),
            CompletionCondition::AllFieldsComplete { name } => {
                f.debug_struct("AllFieldsComplete").field("name", name).finish()
            }
            CompletionCondition::Custom { name, description, .. } => f
                .debug_struct("Custom")
                .field("name", name)
                .field("description", description)
                .finish_non_exhaustive(),
            CompletionCondition::AllOf { name, conditions } => f
                .debug_struct("AllOf")
                .field("name", name)
                .field("conditions", conditions)
                .finish(),
        }
    }
}
