//! Fit configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for `fit.json` (EM options and conjugate priors)
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation
//! - Config snapshots recorded alongside fit reports

pub mod fit;
pub mod load;
pub mod priors;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use fit::{EmConfig, FitConfig};
pub use load::{load_fit_config, ResolvedConfig};
pub use priors::Priors;
pub use resolve::{resolve_config, ConfigPaths, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_fit_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
