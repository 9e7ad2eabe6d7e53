//! Exit codes for the `ssm-core` CLI.
//!
//! Exit code ranges:
//! - 0: Success
//! - 10-19: User/input errors (fixable by changing arguments, config or data)
//! - 20-29: Internal and environment errors

use crate::error::InferenceError;

/// Exit codes for `ssm-core` commands.
///
/// These codes are a stable contract for scripts driving the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed
    Clean = 0,

    // ========================================================================
    // User / Input Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Fit configuration failed to load or validate
    ConfigError = 11,

    /// Model parameters are malformed (shapes, simplex, ranges)
    ModelError = 12,

    /// Emission data is malformed or empty
    DataError = 13,

    /// Config or model file written for another schema version
    VersionError = 14,

    // ========================================================================
    // Internal / Environment Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// A recursion hit a non positive definite matrix
    NumericalError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Clean
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Codes 20-29.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::ModelError => "ERR_MODEL",
            ExitCode::DataError => "ERR_DATA",
            ExitCode::VersionError => "ERR_VERSION",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::NumericalError => "ERR_NUMERICAL",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&InferenceError> for ExitCode {
    fn from(err: &InferenceError) -> Self {
        match err {
            InferenceError::InvalidParameterShape(_) | InferenceError::InvalidParameter { .. } => {
                ExitCode::ModelError
            }
            InferenceError::DimensionMismatch(_)
            | InferenceError::EmptyBatch(_)
            | InferenceError::Json(_) => ExitCode::DataError,
            InferenceError::NonPositiveDefinitePrecision { .. } => ExitCode::NumericalError,
            InferenceError::Config(ssm_config::ValidationError::VersionMismatch { .. }) => {
                ExitCode::VersionError
            }
            InferenceError::Config(_) => ExitCode::ConfigError,
            InferenceError::Io(_) => ExitCode::IoError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
