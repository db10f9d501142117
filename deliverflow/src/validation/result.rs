//! Validation results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classify::{classify_errors, ErrorType};

/// The two validation failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// Structural, type or enum violation inside one document.
    Schema,
    /// Reference to something missing from a sibling document.
    Crosslink,
}

impl ValidationErrorKind {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Crosslink => "crosslink",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One problem found in a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Failure class.
    pub kind: ValidationErrorKind,
    /// Location inside the candidate, e.g. `segments[2].block_id`.
    pub path: String,
    /// What is wrong.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a schema issue.
    #[must_use]
    pub fn schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::Schema,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a crosslink issue.
    #[must_use]
    pub fn crosslink(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::Crosslink,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.kind, self.path, self.message)
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when no issues were found.
    pub ok: bool,
    /// Issues found, in rule order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// A passing result.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            ok: true,
            issues: Vec::new(),
        }
    }

    /// A result derived from a list of issues.
    #[must_use]
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        Self {
            ok: issues.is_empty(),
            issues,
        }
    }

    /// Issues rendered as `kind: path: message` strings.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    /// Dominant error class of the issues.
    #[must_use]
    pub fn error_type(&self) -> ErrorType {
        classify_errors(&self.issues)
    }
}
