//! Configuration snapshots recorded alongside fit reports.
//!
//! A snapshot captures the configuration a fit actually ran with, so a
//! report can be traced back to the exact `fit.json` (or the defaults).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fit::FitConfig;
use crate::resolve::{ConfigPaths, ConfigSource};

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the fit config was loaded from.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Source of the fit configuration.
    pub config_source: String,

    /// SHA-256 of the raw config file, or of the canonical JSON of the
    /// defaults when no file was loaded.
    pub config_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub num_iterations: usize,
    pub convergence_tolerance: f64,
    pub parallel: bool,
    /// True when every emission prior is flat (maximum-likelihood EM).
    pub flat_priors: bool,
}

impl ConfigSnapshot {
    /// Create a snapshot from a loaded configuration.
    ///
    /// `raw_json` is the file content when the config came from disk.
    pub fn new(config: &FitConfig, paths: &ConfigPaths, raw_json: Option<&str>) -> Self {
        let config_hash = match raw_json {
            Some(raw) => hash_content(raw),
            None => hash_content(&serde_json::to_string(config).unwrap_or_default()),
        };

        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            config_path: paths.fit.as_ref().map(|p| p.display().to_string()),
            config_source: paths.fit_source.to_string(),
            config_hash,
            summary: ConfigSummary::from_config(config),
        }
    }

    /// Create a snapshot for the built-in defaults.
    pub fn defaults_only() -> Self {
        let paths = ConfigPaths {
            fit: None,
            fit_source: ConfigSource::BuiltinDefault,
        };
        Self::new(&FitConfig::default(), &paths, None)
    }

    /// Check if this snapshot was taken from the same configuration.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

impl ConfigSummary {
    fn from_config(config: &FitConfig) -> Self {
        let p = &config.priors;
        ConfigSummary {
            num_iterations: config.em.num_iterations,
            convergence_tolerance: config.em.convergence_tolerance,
            parallel: config.em.parallel,
            flat_priors: p.initial_dirichlet().is_flat()
                && p.transition_dirichlet().is_flat()
                && p.bernoulli.is_flat()
                && p.poisson.rate == 0.0
                && p.poisson.shape == 1.0,
        }
    }
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
