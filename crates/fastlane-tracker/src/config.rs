//! Configuration for the tracker
//!
//! The set of tracked fields is fixed for the life of a stream. Fields can be
//! declared in TOML:
//!
//! ```toml
//! [[fields]]
//! name = "name"
//! required = true
//!
//! [[fields]]
//! name = "bio"
//! display_name = "Biography"
//! ```

use crate::condition::CompletionCondition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the default required-fields condition
pub const REQUIRED_READY: &str = "required_ready";

/// Name of the default all-fields condition
pub const ALL_COMPLETE: &str = "all_complete";

/// One tracked field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name as read by the extractor
    pub name: String,

    /// Whether the field gates the fast transition
    #[serde(default)]
    pub required: bool,

    /// Optional label for reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl FieldSpec {
    /// An optional field
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            display_name: None,
        }
    }

    /// A required field
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::optional(name)
        }
    }

    /// Label for reporting, falling back to the field name
    pub fn effective_display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Fixed, ordered set of fields a tracker watches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracked fields
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl TrackerConfig {
    /// Build from a field list and the subset of it that is required
    ///
    /// # Examples
    ///
    /// ```
    /// use fastlane_tracker::TrackerConfig;
    ///
    /// let config = TrackerConfig::from_fields(
    ///     ["name", "email", "bio", "age"],
    ///     ["name", "email"],
    /// );
    /// assert_eq!(config.required_fields(), vec!["name", "email"]);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn from_fields<F, R>(fields: F, required: R) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let required: HashSet<String> = required.into_iter().map(Into::into).collect();
        let fields = fields
            .into_iter()
            .map(Into::into)
            .map(|name| {
                if required.contains(&name) {
                    FieldSpec::required(name)
                } else {
                    FieldSpec::optional(name)
                }
            })
            .collect();
        Self { fields }
    }

    /// All field names, in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Required field names, in declaration order
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The two standard milestones: required fields ready, then all fields
    ///
    /// The required-fields condition is omitted when no field is required.
    pub fn default_conditions(&self) -> Vec<CompletionCondition> {
        let required = self.required_fields();
        let mut conditions = Vec::with_capacity(2);
        if !required.is_empty() {
            conditions.push(CompletionCondition::required(REQUIRED_READY, required));
        }
        conditions.push(CompletionCondition::all_fields(ALL_COMPLETE));
        conditions
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("at least one field must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err("field names must not be empty".to_string());
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!("duplicate field name '{}'", field.name));
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionKind;

    fn profile_config() -> TrackerConfig {
        TrackerConfig::from_fields(
            ["name", "email", "is_verified", "bio", "age", "is_premium"],
            ["name", "email", "is_verified"],
        )
    }

    #[test]
    fn test_from_fields_marks_required() {
        let config = profile_config();
        assert_eq!(config.field_names().len(), 6);
        assert_eq!(config.required_fields(), vec!["name", "email", "is_verified"]);
        assert!(!config.field("bio").unwrap().required);
    }

    #[test]
    fn test_default_conditions() {
        let conditions = profile_config().default_conditions();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].name(), REQUIRED_READY);
        assert_eq!(conditions[0].kind(), ConditionKind::RequiredFields);
        assert_eq!(conditions[1].name(), ALL_COMPLETE);
    }

    #[test]
    fn test_default_conditions_without_required_fields() {
        let config = TrackerConfig::from_fields(["a", "b"], Vec::<String>::new());
        let conditions = config.default_conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].kind(), ConditionKind::AllFields);
    }

    #[test]
    fn test_empty_config_is_invalid() {
        assert!(TrackerConfig::default().validate().is_err());
    }

    #[test]
    fn test_duplicate_field_is_invalid() {
        let config = TrackerConfig::from_fields(["name", "name"], ["name"]);
        assert!(config.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_blank_field_is_invalid() {
        let config = TrackerConfig::from_fields(["name", "  "], ["name"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = TrackerConfig::from_toml(
            r#"
            [[fields]]
            name = "name"
            required = true

            [[fields]]
            name = "bio"
            display_name = "Biography"
            "#,
        )
        .unwrap();
        assert_eq!(config.required_fields(), vec!["name"]);
        assert_eq!(config.field("bio").unwrap().effective_display_name(), "Biography");
        assert_eq!(config.field("name").unwrap().effective_display_name(), "name");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = profile_config();
        let toml_str = config.to_toml().unwrap();
        let parsed = TrackerConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }
}
