//! Typed manual edits and edit preservation.
//!
//! An [`EditPatch`] replaces one top-level field of a deliverable document and
//! records the field name in the document's `edited_fields` list. An
//! [`EditSnapshot`] captures those fields before a regeneration so they can be
//! laid back on top of the fresh content.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

use crate::errors::{DeliverflowError, Result};

/// Key under which edited field names are stored in a document.
pub const EDITED_FIELDS_KEY: &str = "edited_fields";

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("field name pattern is valid"));

/// A validated top-level field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldName(String);

impl FieldName {
    /// Validates a field name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name == EDITED_FIELDS_KEY {
            return Err(DeliverflowError::InvalidEdit(format!("'{name}' is reserved")));
        }
        if !FIELD_NAME.is_match(&name) {
            return Err(DeliverflowError::InvalidEdit(format!(
                "field name '{name}' must match [a-z0-9_]+"
            )));
        }
        Ok(Self(name))
    }

    /// Returns the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldName {
    type Error = DeliverflowError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FieldName> for String {
    fn from(name: FieldName) -> Self {
        name.0
    }
}

/// Replaces one top-level field of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditPatch {
    /// The field to replace.
    pub field: FieldName,
    /// The new value.
    pub value: Value,
}

impl EditPatch {
    /// Creates a patch, validating the field name.
    pub fn new(field: impl Into<String>, value: Value) -> Result<Self> {
        Ok(Self {
            field: FieldName::new(field)?,
            value,
        })
    }

    /// Applies the patch and records the field as edited.
    pub fn apply(&self, content: &mut Value) -> Result<()> {
        let object = content
            .as_object_mut()
            .ok_or_else(|| {
                DeliverflowError::InvalidEdit("content is not a JSON object".to_string())
            })?;
        object.insert(self.field.to_string(), self.value.clone());

        let mut fields = read_edited_fields(object);
        if !fields.contains(&self.field) {
            fields.push(self.field.clone());
        }
        write_edited_fields(object, &fields);
        Ok(())
    }
}

/// Field names recorded as edited in a document. Unrecognized entries are
/// ignored.
#[must_use]
pub fn edited_fields(content: &Value) -> Vec<FieldName> {
    content.as_object().map(read_edited_fields).unwrap_or_default()
}

fn read_edited_fields(object: &serde_json::Map<String, Value>) -> Vec<FieldName> {
    object
        .get(EDITED_FIELDS_KEY)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .filter_map(|name| FieldName::new(name).ok())
        .collect()
}

fn write_edited_fields(object: &mut serde_json::Map<String, Value>, fields: &[FieldName]) {
    let names = fields.iter().map(|f| Value::String(f.to_string())).collect();
    object.insert(EDITED_FIELDS_KEY.to_string(), Value::Array(names));
}

/// Edited fields and their values, captured before a regeneration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSnapshot {
    fields: Vec<(FieldName, Value)>,
}

impl EditSnapshot {
    /// Captures every edited field that still has a value.
    #[must_use]
    pub fn capture(content: &Value) -> Self {
        let fields = edited_fields(content)
            .into_iter()
            .filter_map(|name| {
                let value = content.get(name.as_str())?.clone();
                Some((name, value))
            })
            .collect();
        Self { fields }
    }

    /// True when nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The captured field names.
    #[must_use]
    pub fn field_names(&self) -> Vec<&FieldName> {
        self.fields.iter().map(|(name, _)| name).collect()
    }

    /// Writes the captured values onto `content` and restores the
    /// `edited_fields` list.
    pub fn reapply(&self, content: &mut Value) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let object = content.as_object_mut().ok_or_else(|| {
            DeliverflowError::InvalidEdit("regenerated content is not a JSON object".to_string())
        })?;
        for (name, value) in &self.fields {
            object.insert(name.to_string(), value.clone());
        }
        let names: Vec<FieldName> = self.fields.iter().map(|(name, _)| name.clone()).collect();
        write_edited_fields(object, &names);
        Ok(())
    }
}
