//! Assessor configuration and its validation

use crate::matcher::MatcherConfig;
use crate::recommendation::Playbook;
use crate::sanctions::SanctionsConfig;
use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors, fatal at construction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("score weights sum to {sum}, expected 1.0")]
    WeightsDoNotSumToOne { sum: f64 },

    #[error("{name} = {value} is outside [0, 1]")]
    WeightOutOfRange { name: String, value: f64 },

    #[error("tier thresholds must satisfy 0 < medium < high <= 1 (medium {medium}, high {high})")]
    InvalidThresholds { medium: f64, high: f64 },

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("cannot read configuration: {0}")]
    Io(String),

    #[error("cannot parse configuration: {0}")]
    Parse(String),
}

/// Everything an assessor needs besides the dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssessorConfig {
    pub matcher: MatcherConfig,
    pub scoring: ScoringConfig,
    pub playbook: Playbook,
    pub sanctions: SanctionsConfig,
}

impl AssessorConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.matcher.validate()?;
        self.scoring.validate()?;
        self.playbook.validate()?;
        self.sanctions.validate()
    }

    /// Parse and validate a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: AssessorConfig =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
