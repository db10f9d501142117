//! Candidate validation.
//!
//! A [`Validator`] checks one candidate document against its own shape
//! (schema issues) and against the sibling documents already produced for
//! the project (crosslink issues). Validators are synchronous and never
//! trigger generation.

mod result;
mod rules;
mod standard;

pub use result::{ValidationErrorKind, ValidationIssue, ValidationResult};
pub use rules::{FieldKind, Rule, RuleValidator};

use serde_json::Value;
use std::collections::BTreeMap;

use crate::catalog::DeliverableId;

/// Checks candidate documents.
pub trait Validator: Send + Sync {
    /// Validates `candidate` for `deliverable`.
    ///
    /// `siblings` holds the current content of every other deliverable of the
    /// project that has a pointer.
    fn validate(
        &self,
        deliverable: DeliverableId,
        candidate: &Value,
        siblings: &BTreeMap<DeliverableId, Value>,
    ) -> ValidationResult;
}
