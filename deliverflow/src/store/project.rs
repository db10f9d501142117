//! Project records and deliverable pointers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::artifact_id::ArtifactId;
use crate::catalog::DeliverableId;

/// Names the current artifact for one deliverable of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverablePointer {
    /// The artifact currently considered "the" content.
    pub artifact_id: ArtifactId,
    /// Whether that content is known-valid.
    pub validated: bool,
    /// When the content was generated.
    pub generated_at: DateTime<Utc>,
    /// When the content was last edited by hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// Pointer-only mutations. Content changes go through
/// [`crate::store::DeliverableStore::atomic_artifact_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerUpdate {
    /// A manual edit landed: invalidate and stamp `edited_at`.
    MarkEdited {
        /// Edit timestamp.
        at: DateTime<Utc>,
    },
    /// Recompute validity without touching content.
    SetValidated(bool),
}

impl DeliverablePointer {
    pub(crate) fn apply(&mut self, update: PointerUpdate) {
        match update {
            PointerUpdate::MarkEdited { at } => {
                self.validated = false;
                self.edited_at = Some(at);
            }
            PointerUpdate::SetValidated(validated) => self.validated = validated,
        }
    }
}

/// A project as seen by the engine.
///
/// Settings are opaque generation context. The pointer map can only be
/// changed by the store, which funnels every mutation through its narrow
/// write operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Project identity.
    pub id: String,
    /// Current run identifier; rotated whenever a full run starts.
    pub run_id: String,
    /// Free-form settings handed to the generator.
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pointers: BTreeMap<DeliverableId, DeliverablePointer>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last saved.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates a project with a fresh run id and no pointers.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            run_id: new_run_id(),
            settings: serde_json::Map::new(),
            pointers: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds a setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Returns the pointer for a deliverable.
    #[must_use]
    pub fn pointer(&self, deliverable: DeliverableId) -> Option<&DeliverablePointer> {
        self.pointers.get(&deliverable)
    }

    /// Returns every pointer, in display order.
    #[must_use]
    pub fn pointers(&self) -> &BTreeMap<DeliverableId, DeliverablePointer> {
        &self.pointers
    }

    /// True when the deliverable has a validated pointer.
    #[must_use]
    pub fn is_validated(&self, deliverable: DeliverableId) -> bool {
        self.pointers.get(&deliverable).is_some_and(|p| p.validated)
    }

    pub(crate) fn without_pointers(mut self) -> Self {
        self.pointers.clear();
        self
    }

    pub(crate) fn set_pointer(&mut self, deliverable: DeliverableId, pointer: DeliverablePointer) {
        self.pointers.insert(deliverable, pointer);
    }

    pub(crate) fn pointer_mut(
        &mut self,
        deliverable: DeliverableId,
    ) -> Option<&mut DeliverablePointer> {
        self.pointers.get_mut(&deliverable)
    }
}

pub(crate) fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}
