//! Emission model interface shared by every HMM observation family.
//!
//! The smoother and the EM driver only ever see the trait; each family
//! provides its own log-likelihood, expected sufficient statistics, and
//! conjugate MAP update.

use std::fmt::Debug;
use std::ops::Add;

use nalgebra::DMatrix;
use rand::Rng;
use ssm_config::Priors;

use crate::error::Result;

/// Per-state observation model of an HMM.
pub trait EmissionModel: Clone + Debug + Send + Sync {
    /// Expected sufficient statistics accumulated by the E-step. Batch
    /// reduction adds them elementwise.
    type Stats: Clone + Debug + Send + Sync + Add<Output = Self::Stats>;

    /// Family name used in reports and logs.
    const FAMILY: &'static str;

    fn num_states(&self) -> usize;

    /// Number of columns of an observation.
    fn emission_dim(&self) -> usize;

    /// Log-likelihood of one observation row under `state`.
    fn log_likelihood(&self, state: usize, obs: &[f64]) -> f64;

    /// T×K matrix of log-likelihoods for a T×D emission matrix.
    fn conditional_logliks(&self, emissions: &DMatrix<f64>) -> DMatrix<f64> {
        let num_states = self.num_states();
        let mut out = DMatrix::zeros(emissions.nrows(), num_states);
        let mut row = vec![0.0; emissions.ncols()];
        for t in 0..emissions.nrows() {
            for (d, v) in row.iter_mut().enumerate() {
                *v = emissions[(t, d)];
            }
            for k in 0..num_states {
                out[(t, k)] = self.log_likelihood(k, &row);
            }
        }
        out
    }

    /// Accumulate sufficient statistics of `emissions` (T×D) weighted by
    /// the smoothed state probabilities `weights` (T×K).
    fn sufficient_stats(&self, emissions: &DMatrix<f64>, weights: &DMatrix<f64>) -> Self::Stats;

    /// Conjugate MAP update from aggregated statistics.
    fn m_step(&self, stats: &Self::Stats, priors: &Priors) -> Self;

    /// Log prior density of the current parameters.
    fn log_prior(&self, priors: &Priors) -> f64;

    /// Check parameter ranges (probabilities in [0, 1], positive rates...).
    fn validate(&self) -> Result<()>;

    /// Draw one observation row from `state`.
    fn sample<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Vec<f64>;
}

/// Per-state total weight: the column sums of a T×K weight matrix.
pub(crate) fn state_occupancy(weights: &DMatrix<f64>) -> Vec<f64> {
    (0..weights.ncols()).map(|k| weights.column(k).sum()).collect()
}

/// Check every entry of a parameter matrix against `ok`.
pub(crate) fn check_entries(
    name: &str,
    values: &DMatrix<f64>,
    requirement: &str,
    ok: impl Fn(f64) -> bool,
) -> Result<()> {
    for k in 0..values.nrows() {
        for d in 0..values.ncols() {
            let v = values[(k, d)];
            if !ok(v) {
                return Err(crate::error::InferenceError::invalid(
                    format!("{}[{}][{}]", name, k, d),
                    format!("{} (got {})", requirement, v),
                ));
            }
        }
    }
    Ok(())
}
