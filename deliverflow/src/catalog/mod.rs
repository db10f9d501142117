//! The deliverable catalog.
//!
//! This module provides:
//! - The fixed set of deliverable identifiers
//! - Catalog entries with declared dependencies and export flags
//! - Graph queries: topological order and transitive dependents

mod deliverable;
mod graph;

pub use deliverable::{DeliverableId, ParseDeliverableIdError};
pub use graph::{Catalog, CatalogBuilder, CatalogEntry};
