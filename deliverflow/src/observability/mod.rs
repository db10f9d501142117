//! Tracing setup and span helpers.

use tracing::Span;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::catalog::DeliverableId;
use crate::errors::{DeliverflowError, Result};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and falls back to [`DEFAULT_FILTER`].
/// With `json` set, events are written as JSON lines.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.map_err(|e| DeliverflowError::Config(format!("tracing already initialized: {e}")))
}

/// Span wrapping one run or regeneration.
#[must_use]
pub fn run_span(project_id: &str, run_id: &str, operation: &'static str) -> Span {
    tracing::info_span!("deliverflow.run", project_id, run_id, operation)
}

/// Span wrapping one stage of a run.
#[must_use]
pub fn stage_span(deliverable: DeliverableId) -> Span {
    tracing::info_span!("deliverflow.stage", deliverable = %deliverable)
}
