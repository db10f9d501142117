//! Error types for the deliverflow engine.
//!
//! Failures fall into four classes: readiness-blocked, validation failure,
//! store-integrity failure and unknown/transport failure. Each class has a
//! structured error type so callers can render a specific message; the
//! [`crate::classify::ErrorClassifier`] folds them into the small taxonomy
//! consumed by presentation code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::catalog::DeliverableId;
use crate::classify::ErrorType;
use crate::generation::GenerationError;
use crate::readiness::MissingField;
use crate::store::StorageError;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DeliverflowError>;

/// The main error type for deliverflow operations.
#[derive(Debug, Error)]
pub enum DeliverflowError {
    /// The readiness gate found missing input.
    #[error("{0}")]
    ReadinessBlocked(#[from] ReadinessBlockedError),

    /// A candidate kept failing validation after every repair attempt.
    #[error("{0}")]
    ValidationFailed(#[from] ValidationFailedError),

    /// The backing store did not honor a write, or a pointer rotted.
    #[error("{0}")]
    StoreIntegrity(#[from] StoreIntegrityError),

    /// The generation capability itself failed.
    #[error("{0}")]
    Generation(#[from] GenerationFailedError),

    /// A catalog definition was rejected.
    #[error("{0}")]
    Catalog(#[from] CatalogError),

    /// An artifact identifier was malformed.
    #[error("{0}")]
    ArtifactId(#[from] ArtifactIdError),

    /// A declared dependency has no validated pointer.
    #[error(
        "Deliverable '{deliverable}' cannot start: dependencies not validated: {}",
        join_ids(.missing)
    )]
    DependencyNotReady {
        /// The stage that was about to run.
        deliverable: DeliverableId,
        /// Dependencies lacking a validated pointer.
        missing: Vec<DeliverableId>,
    },

    /// The run was cancelled cooperatively.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Another run for the same project holds the run lock.
    #[error("A run is already in progress for project '{0}'")]
    RunInProgress(String),

    /// No project record exists for the id.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// A project record already exists for the id.
    #[error("Project already exists: {0}")]
    ProjectExists(String),

    /// The deliverable has no current artifact to operate on.
    #[error("Project '{project_id}' has no current artifact for '{deliverable}'")]
    NoCurrentArtifact {
        /// The project id.
        project_id: String,
        /// The deliverable.
        deliverable: DeliverableId,
    },

    /// A manual edit was rejected.
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend storage failed.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeliverflowError {
    /// Stable error code for logs and API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadinessBlocked(_) => "DELIV-001-BLOCKED",
            Self::ValidationFailed(_) => "DELIV-002-VALIDATION",
            Self::StoreIntegrity(_) => "DELIV-003-STORE",
            Self::Generation(_) => "DELIV-004-GENERATION",
            Self::Catalog(_) => "DELIV-005-CATALOG",
            Self::ArtifactId(_) => "DELIV-006-ARTIFACT_ID",
            Self::DependencyNotReady { .. } => "DELIV-007-DEPENDENCY",
            Self::Cancelled(_) => "DELIV-008-CANCELLED",
            Self::RunInProgress(_) => "DELIV-009-BUSY",
            Self::ProjectNotFound(_) | Self::NoCurrentArtifact { .. } => "DELIV-010-NOT_FOUND",
            Self::InvalidEdit(_) => "DELIV-011-EDIT",
            Self::Config(_) => "DELIV-012-CONFIG",
            Self::Storage(_) | Self::Serialization(_) => "DELIV-013-BACKEND",
            Self::ProjectExists(_) => "DELIV-014-EXISTS",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::ReadinessBlocked(err) => {
                map.insert("missing".to_string(), serde_json::json!(err.missing));
            }
            Self::ValidationFailed(err) => {
                map.insert("deliverable".to_string(), serde_json::json!(err.deliverable));
                map.insert("errors".to_string(), serde_json::json!(err.errors));
                map.insert("error_type".to_string(), serde_json::json!(err.error_type));
            }
            Self::Generation(err) => {
                map.insert("deliverable".to_string(), serde_json::json!(err.deliverable));
            }
            Self::DependencyNotReady { deliverable, missing } => {
                map.insert("deliverable".to_string(), serde_json::json!(deliverable));
                map.insert("missing".to_string(), serde_json::json!(missing));
            }
            _ => {}
        }

        map
    }
}

fn join_ids(ids: &[DeliverableId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raised by the readiness gate before any generation happens.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Readiness check blocked the run; missing: {}", self.field_names().join(", "))]
pub struct ReadinessBlockedError {
    /// Ordered list of missing inputs with a justification each.
    pub missing: Vec<MissingField>,
}

impl ReadinessBlockedError {
    /// Creates a new readiness-blocked error.
    #[must_use]
    pub fn new(missing: Vec<MissingField>) -> Self {
        Self { missing }
    }

    /// Names of the missing fields, in order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.field.as_str()).collect()
    }
}

/// Raised when the repair loop is exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error(
    "Deliverable '{deliverable}' failed {error_type} validation after {attempts} attempt(s): {}",
    .errors.join("; ")
)]
pub struct ValidationFailedError {
    /// The failing deliverable.
    pub deliverable: DeliverableId,
    /// Errors reported for the last candidate.
    pub errors: Vec<String>,
    /// Dominant error class.
    pub error_type: ErrorType,
    /// Number of generation attempts made.
    pub attempts: usize,
}

/// Backing-store integrity failures. Never silently ignored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreIntegrityError {
    /// Read-after-write returned different content.
    #[error("Write verification failed for '{key}': stored content differs from what was written")]
    VerifyMismatch {
        /// The storage key.
        key: String,
    },

    /// Read-after-write found nothing.
    #[error("Write verification failed for '{key}': key absent immediately after write")]
    VerifyMissing {
        /// The storage key.
        key: String,
    },

    /// Stored bytes could not be decoded.
    #[error("Stored record '{key}' is corrupt: {reason}")]
    Corrupt {
        /// The storage key.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// A failed write could not be undone; the pointer naming the key was
    /// marked unvalidated.
    #[error("Write to '{key}' failed ({write_error}) and rollback failed ({restore_error})")]
    RollbackFailed {
        /// The storage key.
        key: String,
        /// The original write failure.
        write_error: String,
        /// The failure hit while restoring the previous body.
        restore_error: String,
    },

    /// A pointer names an artifact that no longer exists.
    #[error("Pointer for '{deliverable}' names missing artifact '{artifact_id}'")]
    PointerRot {
        /// The deliverable whose pointer rotted.
        deliverable: DeliverableId,
        /// The missing artifact id.
        artifact_id: String,
    },
}

/// Raised when the generation capability errors (transport, timeout...).
#[derive(Debug, Clone, Error)]
#[error("Generation failed for '{deliverable}' on attempt {attempt}: {source}")]
pub struct GenerationFailedError {
    /// The deliverable being generated.
    pub deliverable: DeliverableId,
    /// Attempt number (1-based).
    pub attempt: usize,
    /// Underlying capability error.
    #[source]
    pub source: GenerationError,
}

/// Error raised when a cycle is detected in a catalog definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Cycle detected in catalog: {}", join_ids(.cycle_path))]
pub struct CycleDetectedError {
    /// The path of deliverables forming the cycle.
    pub cycle_path: Vec<DeliverableId>,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<DeliverableId>) -> Self {
        Self { cycle_path }
    }
}

/// Catalog construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// No entries were added.
    #[error("Catalog has no entries")]
    Empty,

    /// The readiness-check stage is absent.
    #[error("Catalog must contain the readiness stage '{0}'")]
    MissingReadinessStage(DeliverableId),

    /// The readiness-check stage declared dependencies.
    #[error("Readiness stage '{0}' must not declare dependencies")]
    GatedReadinessStage(DeliverableId),

    /// A content stage has no dependencies and would bypass the gate.
    #[error("Deliverable '{0}' declares no dependencies and would bypass the readiness gate")]
    UngatedDeliverable(DeliverableId),

    /// A dependency names a deliverable missing from the catalog.
    #[error("Deliverable '{deliverable}' depends on '{dependency}' which is not in the catalog")]
    UnknownDependency {
        /// The dependent.
        deliverable: DeliverableId,
        /// The missing dependency.
        dependency: DeliverableId,
    },

    /// An operation named a deliverable the catalog does not contain.
    #[error("Deliverable '{0}' is not in the catalog")]
    UnknownDeliverable(DeliverableId),

    /// A deliverable lists itself.
    #[error("Deliverable '{0}' depends on itself")]
    SelfDependency(DeliverableId),

    /// The graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),
}

/// Artifact identifier parse/construction errors.
///
/// These indicate a data-integrity bug, not a recoverable user error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArtifactIdError {
    /// Wrong number of colon-separated segments.
    #[error("Artifact id '{id}' has {found} segment(s), expected 4")]
    SegmentCount {
        /// The raw id.
        id: String,
        /// Segments found.
        found: usize,
    },

    /// A segment was empty.
    #[error("Artifact id '{id}' has an empty segment at position {position}")]
    EmptySegment {
        /// The raw id.
        id: String,
        /// Zero-based segment index.
        position: usize,
    },

    /// A component contains the separator.
    #[error("Artifact id component '{0}' must not contain ':'")]
    SeparatorInComponent(String),

    /// The deliverable segment is not a known deliverable.
    #[error("Artifact id '{id}' names unknown deliverable '{segment}'")]
    UnknownDeliverable {
        /// The raw id.
        id: String,
        /// The offending segment.
        segment: String,
    },

    /// The version segment is not supported.
    #[error("Artifact id '{id}' has unsupported version '{version}'")]
    UnsupportedVersion {
        /// The raw id.
        id: String,
        /// The offending version.
        version: String,
    },
}
