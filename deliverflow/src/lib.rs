//! # Deliverflow
//!
//! A deliverable pipeline engine: a project's source inputs become a fixed
//! catalog of interdependent structured documents.
//!
//! Deliverflow provides:
//!
//! - **Dependency-ordered generation**: A static catalog of deliverables with declared dependencies
//! - **Readiness gating**: Runs are blocked up front when required input is missing
//! - **Validation and repair**: Schema and cross-link checks with a bounded repair loop
//! - **Crash-safe pointers**: A pointer only moves after its artifact is written and read back
//! - **Selective regeneration**: Cascading over transitive dependents, optionally preserving
//!   manual edits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use deliverflow::prelude::*;
//!
//! let store = Arc::new(DeliverableStore::in_memory());
//! store.create_project(Project::new("acme").with_setting("audience", json!("founders"))).await?;
//!
//! let validator = Arc::new(RuleValidator::standard());
//! let orchestrator = Orchestrator::new(store, Arc::new(MyGenerator), validator)
//!     .with_progress_sink(Arc::new(LoggingProgressSink::default()));
//!
//! let report = orchestrator.run("acme", &CancellationToken::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod catalog;
pub mod classify;
pub mod edits;
pub mod errors;
pub mod generation;
pub mod observability;
pub mod orchestrator;
pub mod readiness;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::catalog::{Catalog, CatalogEntry, DeliverableId};
    pub use crate::classify::{ClassifiedFailure, ErrorClassifier, ErrorType, FailureClass};
    pub use crate::edits::{EditPatch, FieldName};
    pub use crate::errors::{
        DeliverflowError, GenerationFailedError, ReadinessBlockedError, Result,
        StoreIntegrityError, ValidationFailedError,
    };
    pub use crate::generation::{GenerationContext, GenerationError, Generator};
    pub use crate::observability::init_tracing;
    pub use crate::orchestrator::{
        LoggingProgressSink, Orchestrator, OrchestratorConfig, ProgressSink, ProjectStatus,
        RegenerateOptions, RunOutcome, RunReport, StageProgress, StageStatus,
    };
    pub use crate::readiness::{ReadinessPolicy, ReadinessReport};
    pub use crate::store::{
        ArtifactId, DeliverablePointer, DeliverableStore, InMemoryKeyValueStore, KeyValueStore,
        Project,
    };
    pub use crate::validation::{RuleValidator, ValidationIssue, ValidationResult, Validator};
}
