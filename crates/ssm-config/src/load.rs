//! Load, validate, and snapshot the fit configuration in one step.

use std::path::Path;

use crate::fit::FitConfig;
use crate::resolve::{resolve_config, ConfigPaths};
use crate::snapshot::ConfigSnapshot;
use crate::validate::{validate_fit_config, ValidationError, ValidationResult};

/// Fit configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: FitConfig,
    pub paths: ConfigPaths,
    /// Raw file content (None when using defaults).
    raw: Option<String>,
}

impl ResolvedConfig {
    /// Create a config snapshot for fit reports.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(&self.config, &self.paths, self.raw.as_deref())
    }
}

/// Resolve, parse, and validate the fit configuration.
///
/// An explicit `cli_path` that does not exist is an error rather than a
/// silent fall-through to the next source.
pub fn load_fit_config(cli_path: Option<&Path>) -> ValidationResult<ResolvedConfig> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ValidationError::IoError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    }

    let paths = resolve_config(cli_path);
    let (config, raw) = match &paths.fit {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            (FitConfig::from_str(&raw)?, Some(raw))
        }
        None => (FitConfig::default(), None),
    };

    validate_fit_config(&config)?;

    Ok(ResolvedConfig { config, paths, raw })
}
