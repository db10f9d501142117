//! Persistence for projects, transcripts and artifacts.
//!
//! The store is split in layers:
//!
//! - [`KeyValueStore`]: the raw backend contract, with in-memory and
//!   filesystem implementations.
//! - [`ArtifactStore`]: artifact documents keyed by [`ArtifactId`], written
//!   with read-after-write verification.
//! - [`DeliverableStore`]: project records and the pointer map, mutated only
//!   through its narrow write operations.

mod artifact_id;
mod artifacts;
mod backend;
#[cfg(feature = "fs-store")]
mod fs;
mod pointers;
mod project;

pub use artifact_id::{ArtifactId, ARTIFACT_VERSION, SEPARATOR};
pub use artifacts::{Artifact, ArtifactStore};
pub use backend::{Collection, InMemoryKeyValueStore, KeyValueStore, StorageError};
#[cfg(feature = "fs-store")]
pub use fs::FsKeyValueStore;
pub use pointers::DeliverableStore;
pub use project::{DeliverablePointer, PointerUpdate, Project};
