//! Top-level fit configuration (`fit.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::priors::Priors;
use crate::validate::ValidationError;

/// Complete configuration for an EM fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub em: EmConfig,

    #[serde(default)]
    pub priors: Priors,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            description: None,
            em: EmConfig::default(),
            priors: Priors::default(),
        }
    }
}

impl FitConfig {
    /// Load a fit configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse a fit configuration from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }
}

/// Options for the EM driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmConfig {
    /// Maximum number of M-steps before stopping.
    pub num_iterations: usize,

    /// Stop once the log-likelihood improves by less than
    /// `convergence_tolerance * max(1, |previous log-likelihood|)`.
    pub convergence_tolerance: f64,

    /// Objective decreases larger than this (relative, same scaling as
    /// `convergence_tolerance`) are reported as divergence warnings.
    pub divergence_tolerance: f64,

    /// Run the per-sequence E-step on the rayon thread pool.
    pub parallel: bool,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            num_iterations: 50,
            convergence_tolerance: 1e-10,
            divergence_tolerance: 1e-6,
            parallel: true,
        }
    }
}

impl EmConfig {
    /// Set the iteration cap.
    pub fn with_num_iterations(mut self, num_iterations: usize) -> Self {
        self.num_iterations = num_iterations;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_convergence_tolerance(mut self, tolerance: f64) -> Self {
        self.convergence_tolerance = tolerance;
        self
    }

    /// Enable or disable the parallel E-step.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = FitConfig::from_str("{}").unwrap();
        assert_eq!(config, FitConfig::default());
        assert_eq!(config.em.num_iterations, 50);
        assert!(config.em.parallel);
    }

    #[test]
    fn partial_em_section_keeps_other_defaults() {
        let config = FitConfig::from_str(r#"{"em": {"num_iterations": 7}}"#).unwrap();
        assert_eq!(config.em.num_iterations, 7);
        assert_eq!(config.em.convergence_tolerance, 1e-10);
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = FitConfig::from_str("{not json").unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn builders_override_fields() {
        let em = EmConfig::default()
            .with_num_iterations(3)
            .with_convergence_tolerance(0.5)
            .with_parallel(false);
        assert_eq!(em.num_iterations, 3);
        assert_eq!(em.convergence_tolerance, 0.5);
        assert!(!em.parallel);
    }
}
