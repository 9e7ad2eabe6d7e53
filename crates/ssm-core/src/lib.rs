//! State-space model inference.
//!
//! This library provides:
//! - Discrete-state HMMs with Bernoulli, Poisson and Gaussian emissions:
//!   forward-backward smoothing, Viterbi decoding, sampling and MAP-EM fitting
//! - Linear-Gaussian state-space models: information-form and covariance-form
//!   Kalman filters
//! - JSON schema, logging and exit codes for the `ssm-core` CLI
//!
//! The binary entry point is in `main.rs`.

pub mod diagnostics;
pub mod error;
pub mod exit_codes;
pub mod hmm;
pub mod lgssm;
pub mod logging;
pub mod schema;

pub use diagnostics::Warning;
pub use error::{InferenceError, Result};
