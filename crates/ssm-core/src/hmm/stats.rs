//! Expected sufficient statistics produced by the E-step.

use std::ops::Add;

use nalgebra::{DMatrix, DVector};

use crate::diagnostics::Warning;
use crate::error::{InferenceError, Result};

/// Sufficient statistics of one sequence, or the sum over a batch.
///
/// `S` is the emission family's own accumulator.
#[derive(Debug, Clone)]
pub struct HmmStats<S> {
    pub marginal_loglik: f64,
    /// Expected initial-state occupancy (smoothed marginal at t = 0).
    pub initial_probs: DVector<f64>,
    /// Expected transition counts (K×K).
    pub trans_probs: DMatrix<f64>,
    pub emission: S,
    /// Number of sequences folded into this bundle.
    pub sequences: usize,
    pub warnings: Vec<Warning>,
}

impl<S: Add<Output = S>> Add for HmmStats<S> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self.warnings.extend(rhs.warnings);
        Self {
            marginal_loglik: self.marginal_loglik + rhs.marginal_loglik,
            initial_probs: self.initial_probs + rhs.initial_probs,
            trans_probs: self.trans_probs + rhs.trans_probs,
            emission: self.emission + rhs.emission,
            sequences: self.sequences + rhs.sequences,
            warnings: self.warnings,
        }
    }
}

/// Fold per-sequence statistics into one bundle.
pub fn sum_stats<S: Add<Output = S>>(stats: Vec<HmmStats<S>>) -> Result<HmmStats<S>> {
    stats
        .into_iter()
        .reduce(|acc, s| acc + s)
        .ok_or_else(|| InferenceError::EmptyBatch("no sequence statistics to sum".to_string()))
}
