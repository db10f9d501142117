//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{DeliverflowError, Result};

/// Environment variable overriding [`OrchestratorConfig::max_repair_attempts`].
pub const ENV_MAX_REPAIR_ATTEMPTS: &str = "DELIVERFLOW_MAX_REPAIR_ATTEMPTS";

/// Environment variable overriding [`OrchestratorConfig::generation_timeout_secs`].
pub const ENV_GENERATION_TIMEOUT_SECS: &str = "DELIVERFLOW_GENERATION_TIMEOUT_SECS";

fn default_max_repair_attempts() -> usize {
    3
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Total generation attempts per stage before it errors, including the
    /// first one.
    #[serde(default = "default_max_repair_attempts")]
    pub max_repair_attempts: usize,
    /// Upper bound on a single generation call, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_timeout_secs: Option<f64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_repair_attempts: default_max_repair_attempts(),
            generation_timeout_secs: None,
        }
    }
}

impl OrchestratorConfig {
    /// Creates a default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt bound.
    #[must_use]
    pub fn with_max_repair_attempts(mut self, attempts: usize) -> Self {
        self.max_repair_attempts = attempts;
        self
    }

    /// Sets the generation timeout.
    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout_secs = Some(timeout.as_secs_f64());
        self
    }

    /// The generation timeout as a [`Duration`].
    #[must_use]
    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs.map(Duration::from_secs_f64)
    }

    /// Checks the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_repair_attempts == 0 {
            return Err(DeliverflowError::Config(
                "max_repair_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(secs) = self.generation_timeout_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(DeliverflowError::Config(format!(
                    "generation timeout must be a positive number of seconds, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Loads defaults overridden by `DELIVERFLOW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MAX_REPAIR_ATTEMPTS) {
            config.max_repair_attempts = raw.trim().parse().map_err(|_| {
                DeliverflowError::Config(format!(
                    "{ENV_MAX_REPAIR_ATTEMPTS} is not an integer: '{raw}'"
                ))
            })?;
        }
        if let Some(raw) = lookup(ENV_GENERATION_TIMEOUT_SECS) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                DeliverflowError::Config(format!(
                    "{ENV_GENERATION_TIMEOUT_SECS} is not a number: '{raw}'"
                ))
            })?;
            config.generation_timeout_secs = Some(secs);
        }
        config.validate()?;
        Ok(config)
    }
}
