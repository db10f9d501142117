//! The generation capability.
//!
//! The engine never talks to a model directly. It hands a
//! [`GenerationContext`] to a [`Generator`] and validates whatever comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::catalog::DeliverableId;

/// Errors raised by a [`Generator`]. None of them are repaired.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// The call did not reach the model or the model refused it.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded the configured generation timeout.
    #[error("generation timed out after {seconds:.1}s")]
    Timeout {
        /// Configured limit.
        seconds: f64,
    },

    /// The response could not be turned into a JSON document.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Everything a generator needs to produce one deliverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Project id.
    pub project_id: String,
    /// Run id the result will be written under.
    pub run_id: String,
    /// The deliverable being produced.
    pub deliverable: DeliverableId,
    /// Project settings.
    pub settings: serde_json::Map<String, Value>,
    /// Primary transcript, if one is stored.
    pub transcript: Option<String>,
    /// Validated content of each declared dependency.
    pub dependencies: BTreeMap<DeliverableId, Value>,
    /// Attempt number, starting at 1.
    pub attempt: usize,
    /// The rejected candidate from the previous attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_candidate: Option<Value>,
    /// Validation errors reported for the previous candidate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
}

impl GenerationContext {
    /// True when this is a repair attempt.
    #[must_use]
    pub fn is_repair(&self) -> bool {
        self.attempt > 1
    }

    /// Prepares the context for the next attempt after a failed validation.
    pub(crate) fn advance(&mut self, candidate: Value, errors: Vec<String>) {
        self.attempt += 1;
        self.previous_candidate = Some(candidate);
        self.validation_errors = errors;
    }
}

/// Produces deliverable documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generates a candidate document for `deliverable`.
    async fn generate(
        &self,
        deliverable: DeliverableId,
        context: &GenerationContext,
    ) -> Result<Value, GenerationError>;
}
