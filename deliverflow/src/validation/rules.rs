//! Declarative validation rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::result::{ValidationIssue, ValidationResult};
use super::Validator;
use crate::catalog::DeliverableId;

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A non-blank string.
    String,
    /// Any number.
    Number,
    /// A boolean.
    Bool,
    /// An array (possibly empty).
    Array,
    /// An object.
    Object,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.as_str().is_some_and(|s| !s.trim().is_empty()),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "a non-empty string",
            Self::Number => "a number",
            Self::Bool => "a boolean",
            Self::Array => "an array",
            Self::Object => "an object",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// One check applied to a candidate document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// The document is a JSON object. Later rules are skipped when it is not.
    RequireObject,
    /// A top-level field exists with the given type.
    RequireField {
        /// Field name.
        field: String,
        /// Expected type.
        kind: FieldKind,
    },
    /// A top-level field is a non-empty array.
    NonEmptyArray {
        /// Field name.
        field: String,
    },
    /// Every item of an array field has `item_field` of the given type.
    ItemsHaveField {
        /// Array field name.
        field: String,
        /// Field required on each item.
        item_field: String,
        /// Expected type.
        kind: FieldKind,
    },
    /// A string field takes one of a fixed set of values.
    OneOf {
        /// Field name.
        field: String,
        /// Accepted values.
        allowed: Vec<String>,
    },
    /// `field[].item_key` must appear among `target.target_field[].target_key`.
    CrossReference {
        /// Array field in the candidate.
        field: String,
        /// Key read from each candidate item.
        item_key: String,
        /// Sibling deliverable holding the referenced items.
        target: DeliverableId,
        /// Array field in the sibling.
        target_field: String,
        /// Key read from each sibling item.
        target_key: String,
    },
    /// Every entry of an array field names a deliverable that has content.
    DeliverableRefs {
        /// Array field name.
        field: String,
    },
}

impl Rule {
    /// Shorthand for [`Rule::RequireField`].
    #[must_use]
    pub fn field(field: &str, kind: FieldKind) -> Self {
        Self::RequireField {
            field: field.to_string(),
            kind,
        }
    }

    /// Shorthand for [`Rule::NonEmptyArray`].
    #[must_use]
    pub fn non_empty(field: &str) -> Self {
        Self::NonEmptyArray {
            field: field.to_string(),
        }
    }

    /// Shorthand for [`Rule::ItemsHaveField`].
    #[must_use]
    pub fn items_have(field: &str, item_field: &str, kind: FieldKind) -> Self {
        Self::ItemsHaveField {
            field: field.to_string(),
            item_field: item_field.to_string(),
            kind,
        }
    }

    /// Checks the rule, appending any issues.
    pub fn check(
        &self,
        candidate: &Value,
        siblings: &BTreeMap<DeliverableId, Value>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        match self {
            Self::RequireObject => {
                if !candidate.is_object() {
                    issues.push(ValidationIssue::schema("$", "document must be a JSON object"));
                }
            }
            Self::RequireField { field, kind } => match candidate.get(field) {
                Some(value) if kind.matches(value) => {}
                Some(_) => issues.push(ValidationIssue::schema(field, format!("must be {kind}"))),
                None => issues.push(ValidationIssue::schema(field, "is required")),
            },
            Self::NonEmptyArray { field } => match candidate.get(field).and_then(Value::as_array) {
                Some(items) if !items.is_empty() => {}
                Some(_) => issues.push(ValidationIssue::schema(field, "must not be empty")),
                None => issues.push(ValidationIssue::schema(field, "must be a non-empty array")),
            },
            Self::ItemsHaveField {
                field,
                item_field,
                kind,
            } => {
                for (i, item) in array_items(candidate, field) {
                    if !item.get(item_field).is_some_and(|v| kind.matches(v)) {
                        issues.push(ValidationIssue::schema(
                            format!("{field}[{i}].{item_field}"),
                            format!("must be {kind}"),
                        ));
                    }
                }
            }
            Self::OneOf { field, allowed } => {
                let value = candidate.get(field).and_then(Value::as_str);
                if !value.is_some_and(|v| allowed.iter().any(|a| a == v)) {
                    issues.push(ValidationIssue::schema(
                        field,
                        format!("must be one of: {}", allowed.join(", ")),
                    ));
                }
            }
            Self::CrossReference {
                field,
                item_key,
                target,
                target_field,
                target_key,
            } => {
                let Some(target_doc) = siblings.get(target) else {
                    issues.push(ValidationIssue::crosslink(
                        field,
                        format!("references '{target}' which has no content"),
                    ));
                    return;
                };
                let known: Vec<&Value> = array_items(target_doc, target_field)
                    .filter_map(|(_, item)| item.get(target_key))
                    .collect();
                for (i, item) in array_items(candidate, field) {
                    let Some(reference) = item.get(item_key) else {
                        continue;
                    };
                    if !known.contains(&reference) {
                        issues.push(ValidationIssue::crosslink(
                            format!("{field}[{i}].{item_key}"),
                            format!(
                                "{reference} not found in {target}.{target_field}[].{target_key}"
                            ),
                        ));
                    }
                }
            }
            Self::DeliverableRefs { field } => {
                for (i, item) in array_items(candidate, field) {
                    let path = format!("{field}[{i}]");
                    match item.as_str().map(str::parse::<DeliverableId>) {
                        Some(Ok(id)) if siblings.contains_key(&id) => {}
                        Some(Ok(id)) => issues.push(ValidationIssue::crosslink(
                            path,
                            format!("'{id}' has not been produced"),
                        )),
                        _ => issues.push(ValidationIssue::schema(path, "must name a deliverable")),
                    }
                }
            }
        }
    }
}

fn array_items<'a>(doc: &'a Value, field: &str) -> impl Iterator<Item = (usize, &'a Value)> {
    doc.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
}

/// A [`Validator`] driven by per-deliverable rule lists.
///
/// Deliverables without rules always pass.
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: HashMap<DeliverableId, Vec<Rule>>,
}

impl RuleValidator {
    /// Creates a validator with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rules for a deliverable.
    #[must_use]
    pub fn with_rules(mut self, deliverable: DeliverableId, rules: Vec<Rule>) -> Self {
        self.rules.insert(deliverable, rules);
        self
    }

    /// The rules for a deliverable.
    #[must_use]
    pub fn rules_for(&self, deliverable: DeliverableId) -> &[Rule] {
        self.rules.get(&deliverable).map(Vec::as_slice).unwrap_or_default()
    }
}

impl Validator for RuleValidator {
    fn validate(
        &self,
        deliverable: DeliverableId,
        candidate: &Value,
        siblings: &BTreeMap<DeliverableId, Value>,
    ) -> ValidationResult {
        let mut issues = Vec::new();
        for rule in self.rules_for(deliverable) {
            rule.check(candidate, siblings, &mut issues);
            if matches!(rule, Rule::RequireObject) && !issues.is_empty() {
                break;
            }
        }
        ValidationResult::from_issues(issues)
    }
}
