//! Error classification.
//!
//! Presentation code does not match on [`DeliverflowError`] directly; it asks
//! the [`ErrorClassifier`] for a [`ClassifiedFailure`] and renders that.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::DeliverableId;
use crate::errors::{DeliverflowError, StoreIntegrityError};
use crate::readiness::MissingField;
use crate::validation::{ValidationErrorKind, ValidationIssue};

/// Error type attached to a validation-failed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Structural violations in one document.
    Schema,
    /// References to missing sibling content.
    Crosslink,
    /// The generation capability failed.
    Api,
    /// Anything else.
    Unknown,
}

impl ErrorType {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Crosslink => "crosslink",
            Self::Api => "api",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Any crosslink issue makes the result a crosslink failure; otherwise schema.
/// An empty list is `unknown`.
#[must_use]
pub fn classify_errors(issues: &[ValidationIssue]) -> ErrorType {
    if issues.is_empty() {
        ErrorType::Unknown
    } else if issues.iter().any(|i| i.kind == ValidationErrorKind::Crosslink) {
        ErrorType::Crosslink
    } else {
        ErrorType::Schema
    }
}

/// Top-level failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Insufficient input; fix the input and run again.
    ReadinessBlocked,
    /// A deliverable kept failing validation.
    ValidationFailed,
    /// The store did not honor a write or a pointer rotted.
    StoreIntegrity,
    /// The caller cancelled the run.
    Cancelled,
    /// Transport or other failures.
    Unknown,
}

/// A failure folded for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFailure {
    /// Failure class.
    pub class: FailureClass,
    /// Stable error code.
    pub code: String,
    /// The deliverable involved, when known.
    pub deliverable: Option<DeliverableId>,
    /// Error type for validation and generation failures.
    pub error_type: Option<ErrorType>,
    /// Human-readable message.
    pub message: String,
    /// Validation error strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Missing readiness fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<MissingField>,
}

impl ClassifiedFailure {
    fn new(class: FailureClass, err: &DeliverflowError) -> Self {
        Self {
            class,
            code: err.code().to_string(),
            deliverable: None,
            error_type: None,
            message: err.to_string(),
            errors: Vec::new(),
            missing_fields: Vec::new(),
        }
    }
}

/// Maps engine errors to [`ClassifiedFailure`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classifies an engine error.
    #[must_use]
    pub fn classify(err: &DeliverflowError) -> ClassifiedFailure {
        match err {
            DeliverflowError::ReadinessBlocked(blocked) => ClassifiedFailure {
                missing_fields: blocked.missing.clone(),
                ..ClassifiedFailure::new(FailureClass::ReadinessBlocked, err)
            },
            DeliverflowError::ValidationFailed(failed) => ClassifiedFailure {
                deliverable: Some(failed.deliverable),
                error_type: Some(failed.error_type),
                errors: failed.errors.clone(),
                ..ClassifiedFailure::new(FailureClass::ValidationFailed, err)
            },
            DeliverflowError::StoreIntegrity(integrity) => ClassifiedFailure {
                deliverable: match integrity {
                    StoreIntegrityError::PointerRot { deliverable, .. } => Some(*deliverable),
                    _ => None,
                },
                ..ClassifiedFailure::new(FailureClass::StoreIntegrity, err)
            },
            DeliverflowError::Generation(generation) => ClassifiedFailure {
                deliverable: Some(generation.deliverable),
                error_type: Some(ErrorType::Api),
                ..ClassifiedFailure::new(FailureClass::Unknown, err)
            },
            DeliverflowError::Cancelled(_) => ClassifiedFailure::new(FailureClass::Cancelled, err),
            DeliverflowError::DependencyNotReady { deliverable, .. } => ClassifiedFailure {
                deliverable: Some(*deliverable),
                error_type: Some(ErrorType::Unknown),
                ..ClassifiedFailure::new(FailureClass::Unknown, err)
            },
            _ => ClassifiedFailure {
                error_type: Some(ErrorType::Unknown),
                ..ClassifiedFailure::new(FailureClass::Unknown, err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GenerationFailedError, ReadinessBlockedError, ValidationFailedError};
    use crate::generation::GenerationError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_errors() {
        assert_eq!(classify_errors(&[]), ErrorType::Unknown);
        assert_eq!(
            classify_errors(&[ValidationIssue::schema("a", "x")]),
            ErrorType::Schema
        );
        assert_eq!(
            classify_errors(&[
                ValidationIssue::schema("a", "x"),
                ValidationIssue::crosslink("b", "y"),
            ]),
            ErrorType::Crosslink
        );
    }

    #[test]
    fn test_classify_readiness_blocked() {
        let err = DeliverflowError::from(ReadinessBlockedError::new(vec![MissingField::new(
            "transcript",
            "needed",
        )]));

        let failure = ErrorClassifier::classify(&err);
        assert_eq!(failure.class, FailureClass::ReadinessBlocked);
        assert_eq!(failure.missing_fields.len(), 1);
        assert_eq!(failure.code, "DELIV-001-BLOCKED");
    }

    #[test]
    fn test_classify_validation_failed_keeps_detail() {
        let err = DeliverflowError::from(ValidationFailedError {
            deliverable: DeliverableId::Workbook,
            errors: vec!["schema: title: is required".to_string()],
            error_type: ErrorType::Schema,
            attempts: 3,
        });

        let failure = ErrorClassifier::classify(&err);
        assert_eq!(failure.class, FailureClass::ValidationFailed);
        assert_eq!(failure.deliverable, Some(DeliverableId::Workbook));
        assert_eq!(failure.error_type, Some(ErrorType::Schema));
        assert_eq!(failure.errors, vec!["schema: title: is required"]);
    }

    #[test]
    fn test_classify_generation_failure_as_api() {
        let err = DeliverflowError::from(GenerationFailedError {
            deliverable: DeliverableId::Profile,
            attempt: 1,
            source: GenerationError::Transport("connection reset".to_string()),
        });

        let failure = ErrorClassifier::classify(&err);
        assert_eq!(failure.class, FailureClass::Unknown);
        assert_eq!(failure.error_type, Some(ErrorType::Api));
        assert!(failure.message.contains("connection reset"));
    }

    #[test]
    fn test_classify_pointer_rot() {
        let err = DeliverflowError::from(StoreIntegrityError::PointerRot {
            deliverable: DeliverableId::Framework,
            artifact_id: "p:r:framework:v1".to_string(),
        });

        let failure = ErrorClassifier::classify(&err);
        assert_eq!(failure.class, FailureClass::StoreIntegrity);
        assert_eq!(failure.deliverable, Some(DeliverableId::Framework));
    }
}
