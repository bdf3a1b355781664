//! Engine configuration with documented defaults
//!
//! Every tunable of the engine lives here. Values can be built in code or
//! read from a TOML file where every field is optional.

use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the run's pseudo-random stream
    ///
    /// The stream is only consulted by `spawn` actions placing at
    /// `random_empty`. A document's top-level `seed` overrides this value.
    pub seed: u64,

    /// Number of past snapshots kept for undo
    ///
    /// The oldest entry is evicted first once the bound is reached.
    pub max_history: usize,

    /// Minimum candidate count before condition filtering runs on the
    /// rayon pool
    ///
    /// Small worlds evaluate a few dozen candidates per tick, where thread
    /// hand-off costs more than the evaluation itself.
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_history: 1000,
            parallel_threshold: 256,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Parse a config from TOML text; missing fields take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_history == 0 {
            return Err(ConfigError::Invalid(
                "max_history must be at least 1".into(),
            ));
        }
        if self.parallel_threshold == 0 {
            return Err(ConfigError::Invalid(
                "parallel_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
