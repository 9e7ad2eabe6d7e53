//! Configuration validation errors and semantic validation.

use ssm_math::{BetaParams, GammaParams, NigParams};
use thiserror::Error;

use crate::fit::{EmConfig, FitConfig};
use crate::priors::Priors;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a complete fit configuration semantically.
pub fn validate_fit_config(config: &FitConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    validate_em(&config.em)?;
    validate_priors(&config.priors)?;

    Ok(())
}

/// Validate EM driver options.
pub fn validate_em(em: &EmConfig) -> ValidationResult<()> {
    if em.num_iterations == 0 {
        return Err(invalid("em.num_iterations", "must be at least 1"));
    }
    check_non_negative("em.convergence_tolerance", em.convergence_tolerance)?;
    check_non_negative("em.divergence_tolerance", em.divergence_tolerance)?;
    Ok(())
}

/// Validate prior hyperparameters.
pub fn validate_priors(priors: &Priors) -> ValidationResult<()> {
    check_concentration("priors.initial_concentration", priors.initial_concentration)?;
    check_concentration(
        "priors.transition_concentration",
        priors.transition_concentration,
    )?;

    let BetaParams { alpha, beta } = priors.bernoulli;
    if BetaParams::new(alpha, beta).is_none() {
        return Err(invalid(
            "priors.bernoulli",
            format!("Beta({}, {}) requires alpha > 0 and beta > 0", alpha, beta),
        ));
    }

    let GammaParams { shape, rate } = priors.poisson;
    if GammaParams::new(shape, rate).is_none() {
        return Err(invalid(
            "priors.poisson",
            format!("Gamma({}, {}) requires shape > 0 and rate >= 0", shape, rate),
        ));
    }
    if rate == 0.0 && shape < 1.0 {
        // Gamma(shape < 1, 0) pushes unvisited states' rates to zero and
        // the mode is no longer a usable estimate.
        return Err(ValidationError::SemanticError(format!(
            "improper Gamma prior needs shape >= 1, got {}",
            shape
        )));
    }

    let nig = priors.gaussian;
    if NigParams::new(nig.mean, nig.mean_strength, nig.shape, nig.scale).is_none() {
        return Err(invalid(
            "priors.gaussian",
            "mean must be finite and mean_strength, shape, scale must be > 0",
        ));
    }

    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, format!("must be finite and >= 0, got {}", value)));
    }
    Ok(())
}

fn check_concentration(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value < 1.0 {
        return Err(invalid(
            field,
            format!("Dirichlet concentration must be >= 1, got {}", value),
        ));
    }
    Ok(())
}
