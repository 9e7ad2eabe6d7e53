//! Error types for inference and fitting.

use thiserror::Error;

/// Errors raised by the HMM and LGSSM routines.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Parameter arrays disagree on the number of states, or a probability
    /// vector is off the simplex.
    #[error("Invalid parameter shape: {0}")]
    InvalidParameterShape(String),

    /// A precision (or covariance) matrix failed its Cholesky factorisation.
    #[error("Matrix is not positive definite at timestep {timestep} ({context})")]
    NonPositiveDefinitePrecision {
        timestep: usize,
        context: &'static str,
    },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ssm_config::ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InferenceError {
    pub(crate) fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        InferenceError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True for failures caused by the caller's parameters or data rather
    /// than by the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            InferenceError::InvalidParameterShape(_)
                | InferenceError::DimensionMismatch(_)
                | InferenceError::EmptyBatch(_)
                | InferenceError::InvalidParameter { .. }
        )
    }
}

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
