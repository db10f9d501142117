//! The readiness gate.
//!
//! A [`ReadinessPolicy`] is evaluated before any generation happens. When a
//! required input is missing the run is blocked with a
//! [`ReadinessBlockedError`] listing every missing field and why it matters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DeliverflowError, ReadinessBlockedError, Result};

/// Minimum non-whitespace characters the standard policy requires of the
/// transcript.
pub const DEFAULT_MIN_TRANSCRIPT_CHARS: usize = 200;

/// A required input that was missing when the gate ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingField {
    /// Name of the missing input.
    pub field: String,
    /// Human-readable justification.
    pub why_it_matters: String,
}

impl MissingField {
    /// Creates a missing-field record.
    #[must_use]
    pub fn new(field: impl Into<String>, why_it_matters: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            why_it_matters: why_it_matters.into(),
        }
    }
}

/// How a requirement is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessCheck {
    /// The primary transcript has at least `min_chars` non-whitespace chars.
    NonEmptyTranscript {
        /// Minimum non-whitespace characters.
        min_chars: usize,
    },
    /// The project setting `key` is present and not blank.
    NonEmptySetting {
        /// Settings key.
        key: String,
    },
}

impl ReadinessCheck {
    fn is_satisfied(
        &self,
        settings: &serde_json::Map<String, Value>,
        transcript: Option<&str>,
    ) -> bool {
        match self {
            Self::NonEmptyTranscript { min_chars } => {
                let chars =
                    transcript.map_or(0, |t| t.chars().filter(|c| !c.is_whitespace()).count());
                chars >= (*min_chars).max(1)
            }
            Self::NonEmptySetting { key } => settings.get(key).is_some_and(is_present),
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// One required input and its justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessRequirement {
    /// Name reported when missing.
    pub field: String,
    /// Why downstream deliverables need it.
    pub why_it_matters: String,
    /// The check itself.
    pub check: ReadinessCheck,
}

impl ReadinessRequirement {
    /// Requires a transcript with at least `min_chars` non-whitespace chars.
    #[must_use]
    pub fn transcript(min_chars: usize, why_it_matters: impl Into<String>) -> Self {
        Self {
            field: "transcript".to_string(),
            why_it_matters: why_it_matters.into(),
            check: ReadinessCheck::NonEmptyTranscript { min_chars },
        }
    }

    /// Requires a non-blank project setting.
    #[must_use]
    pub fn setting(key: impl Into<String>, why_it_matters: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            field: key.clone(),
            why_it_matters: why_it_matters.into(),
            check: ReadinessCheck::NonEmptySetting { key },
        }
    }
}

/// Ordered set of requirements checked by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    requirements: Vec<ReadinessRequirement>,
}

impl ReadinessPolicy {
    /// Creates a policy. Every requirement needs a justification.
    pub fn new(requirements: Vec<ReadinessRequirement>) -> Result<Self> {
        if let Some(r) = requirements.iter().find(|r| r.why_it_matters.trim().is_empty()) {
            return Err(DeliverflowError::Config(format!(
                "readiness requirement '{}' has no justification",
                r.field
            )));
        }
        Ok(Self { requirements })
    }

    /// Transcript plus `audience` and `offer` settings.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            requirements: vec![
                ReadinessRequirement::transcript(
                    DEFAULT_MIN_TRANSCRIPT_CHARS,
                    "Every deliverable is derived from the source transcript.",
                ),
                ReadinessRequirement::setting(
                    "audience",
                    "Copy and lessons are written for a specific reader.",
                ),
                ReadinessRequirement::setting(
                    "offer",
                    "The landing page and emails sell a concrete offer.",
                ),
            ],
        }
    }

    /// The requirements, in check order.
    #[must_use]
    pub fn requirements(&self) -> &[ReadinessRequirement] {
        &self.requirements
    }

    /// Evaluates every requirement and reports all that are missing.
    #[must_use]
    pub fn evaluate(
        &self,
        settings: &serde_json::Map<String, Value>,
        transcript: Option<&str>,
    ) -> ReadinessReport {
        let checked_fields = self.requirements.iter().map(|r| r.field.clone()).collect();
        let missing = self
            .requirements
            .iter()
            .filter(|r| !r.check.is_satisfied(settings, transcript))
            .map(|r| MissingField::new(r.field.clone(), r.why_it_matters.clone()))
            .collect();
        ReadinessReport {
            checked_fields,
            missing,
        }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of evaluating a [`ReadinessPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Every field the gate looked at.
    pub checked_fields: Vec<String>,
    /// Fields that failed their check.
    pub missing: Vec<MissingField>,
}

impl ReadinessReport {
    /// True when nothing is missing.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty()
    }

    /// Converts a failing report into the blocking error.
    pub fn into_result(self) -> std::result::Result<Self, ReadinessBlockedError> {
        if self.is_ready() {
            Ok(self)
        } else {
            Err(ReadinessBlockedError::new(self.missing))
        }
    }

    /// The document persisted as the readiness-check artifact.
    #[must_use]
    pub fn to_document(&self) -> Value {
        serde_json::json!({
            "ready": self.is_ready(),
            "checked_fields": self.checked_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn settings(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_standard_policy_passes_with_full_input() {
        let transcript = "word ".repeat(60);
        let report = ReadinessPolicy::standard().evaluate(
            &settings(&[("audience", json!("founders")), ("offer", json!("course"))]),
            Some(&transcript),
        );

        assert!(report.is_ready());
        assert_eq!(report.checked_fields, vec!["transcript", "audience", "offer"]);
        assert_eq!(
            report.to_document(),
            json!({"ready": true, "checked_fields": ["transcript", "audience", "offer"]})
        );
    }

    #[test]
    fn test_reports_every_missing_field_in_order() {
        let report = ReadinessPolicy::standard().evaluate(
            &settings(&[("audience", json!("   ")), ("offer", json!("course"))]),
            Some("too short"),
        );

        let err = report.into_result().unwrap_err();
        assert_eq!(err.field_names(), vec!["transcript", "audience"]);
        assert!(err.missing.iter().all(|m| !m.why_it_matters.is_empty()));
    }

    #[test]
    fn test_whitespace_does_not_count_toward_transcript() {
        let policy =
            ReadinessPolicy::new(vec![ReadinessRequirement::transcript(5, "needed")]).unwrap();
        let empty = serde_json::Map::new();

        assert!(!policy.evaluate(&empty, Some("a b c d")).is_ready());
        assert!(policy.evaluate(&empty, Some("a b c d e")).is_ready());
        assert!(!policy.evaluate(&empty, None).is_ready());
    }

    #[test]
    fn test_zero_minimum_still_requires_some_transcript() {
        let policy =
            ReadinessPolicy::new(vec![ReadinessRequirement::transcript(0, "needed")]).unwrap();
        assert!(!policy.evaluate(&serde_json::Map::new(), Some("  \n ")).is_ready());
    }

    #[test]
    fn test_setting_presence_rules() {
        assert!(!is_present(&Value::Null));
        assert!(!is_present(&json!([])));
        assert!(is_present(&json!(false)));
        assert!(is_present(&json!({"k": 1})));
    }

    #[test]
    fn test_policy_rejects_missing_justification() {
        let err =
            ReadinessPolicy::new(vec![ReadinessRequirement::setting("offer", " ")]).unwrap_err();
        assert!(matches!(err, DeliverflowError::Config(_)));
    }
}
