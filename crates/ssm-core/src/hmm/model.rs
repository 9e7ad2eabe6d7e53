//! HMM parameter snapshot with E-step, M-step and sampling.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rayon::prelude::*;
use ssm_config::Priors;

use super::emission::EmissionModel;
use super::inference::{
    compute_transition_probs, hmm_filter, hmm_posterior_mode, hmm_smoother, HmmFilterPosterior,
    HmmPosterior,
};
use super::stats::HmmStats;
use crate::error::{InferenceError, Result};

/// Simplex tolerance for the initial distribution and transition rows.
pub const SIMPLEX_TOLERANCE: f64 = 1e-6;

/// Immutable HMM parameters.
///
/// Every M-step returns a new snapshot; nothing mutates one in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Hmm<E> {
    initial_probs: DVector<f64>,
    transition_matrix: DMatrix<f64>,
    emission: E,
}

impl<E: EmissionModel> Hmm<E> {
    /// Validate and assemble HMM parameters.
    ///
    /// Transition rows must sum to one, except that a row of all zeros is
    /// accepted for an unreachable state: zero initial probability and no
    /// inbound transition from any other state.
    pub fn new(
        initial_probs: DVector<f64>,
        transition_matrix: DMatrix<f64>,
        emission: E,
    ) -> Result<Self> {
        let k = initial_probs.len();
        if k == 0 {
            return Err(InferenceError::InvalidParameterShape(
                "model has no states".to_string(),
            ));
        }
        if transition_matrix.shape() != (k, k) {
            return Err(InferenceError::InvalidParameterShape(format!(
                "transition matrix is {:?} for {} initial probabilities",
                transition_matrix.shape(),
                k
            )));
        }
        if emission.num_states() != k {
            return Err(InferenceError::InvalidParameterShape(format!(
                "emission parameters describe {} states, expected {}",
                emission.num_states(),
                k
            )));
        }

        check_simplex("initial_probs", initial_probs.iter().copied(), false)?;
        for i in 0..k {
            check_simplex(
                &format!("transition_matrix[{}]", i),
                transition_matrix.row(i).iter().copied(),
                true,
            )?;
        }
        for i in 0..k {
            if transition_matrix.row(i).iter().any(|&a| a != 0.0) {
                continue;
            }
            let inbound = (0..k).any(|j| j != i && transition_matrix[(j, i)] != 0.0);
            if initial_probs[i] != 0.0 || inbound {
                return Err(InferenceError::InvalidParameterShape(format!(
                    "transition_matrix[{}] is all zero but state {} is reachable",
                    i, i
                )));
            }
        }
        emission.validate()?;

        Ok(Self {
            initial_probs,
            transition_matrix,
            emission,
        })
    }

    pub fn num_states(&self) -> usize {
        self.initial_probs.len()
    }

    pub fn emission_dim(&self) -> usize {
        self.emission.emission_dim()
    }

    pub fn initial_probs(&self) -> &DVector<f64> {
        &self.initial_probs
    }

    pub fn transition_matrix(&self) -> &DMatrix<f64> {
        &self.transition_matrix
    }

    pub fn emission(&self) -> &E {
        &self.emission
    }

    fn conditional_logliks(&self, emissions: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if emissions.ncols() != self.emission_dim() {
            return Err(InferenceError::DimensionMismatch(format!(
                "emissions have {} columns, model expects {}",
                emissions.ncols(),
                self.emission_dim()
            )));
        }
        Ok(self.emission.conditional_logliks(emissions))
    }

    /// Forward-backward posterior of one T×D emission sequence.
    pub fn smoother(&self, emissions: &DMatrix<f64>) -> Result<HmmPosterior> {
        let ll = self.conditional_logliks(emissions)?;
        hmm_smoother(&self.initial_probs, &self.transition_matrix, &ll)
    }

    /// Forward filter of one emission sequence.
    pub fn filter(&self, emissions: &DMatrix<f64>) -> Result<HmmFilterPosterior> {
        let ll = self.conditional_logliks(emissions)?;
        hmm_filter(&self.initial_probs, &self.transition_matrix, &ll)
    }

    /// Viterbi path of one emission sequence.
    pub fn most_likely_states(&self, emissions: &DMatrix<f64>) -> Result<Vec<usize>> {
        let ll = self.conditional_logliks(emissions)?;
        hmm_posterior_mode(&self.initial_probs, &self.transition_matrix, &ll)
    }

    /// Expected sufficient statistics of one sequence.
    pub fn sequence_stats(&self, emissions: &DMatrix<f64>) -> Result<HmmStats<E::Stats>> {
        let post = self.smoother(emissions)?;
        let trans_probs = compute_transition_probs(&self.transition_matrix, &post)?;
        let initial_probs = post.smoothed_probs.row(0).transpose();
        let emission = self
            .emission
            .sufficient_stats(emissions, &post.smoothed_probs);
        Ok(HmmStats {
            marginal_loglik: post.marginal_loglik,
            initial_probs,
            trans_probs,
            emission,
            sequences: 1,
            warnings: post.warnings,
        })
    }

    /// Per-sequence statistics for a batch, in batch order.
    ///
    /// With `parallel` the sequences are processed on the rayon pool.
    pub fn e_step(
        &self,
        batch: &[DMatrix<f64>],
        parallel: bool,
    ) -> Result<Vec<HmmStats<E::Stats>>> {
        if batch.is_empty() {
            return Err(InferenceError::EmptyBatch(
                "E-step needs at least one sequence".to_string(),
            ));
        }
        if parallel {
            batch.par_iter().map(|e| self.sequence_stats(e)).collect()
        } else {
            batch.iter().map(|e| self.sequence_stats(e)).collect()
        }
    }

    /// Conjugate MAP update from batch-summed statistics.
    pub fn m_step(&self, stats: &HmmStats<E::Stats>, priors: &Priors) -> Result<Self> {
        let k = self.num_states();
        if stats.initial_probs.len() != k || stats.trans_probs.shape() != (k, k) {
            return Err(InferenceError::DimensionMismatch(format!(
                "statistics for {} states applied to a {}-state model",
                stats.initial_probs.len(),
                k
            )));
        }

        // Unreachable states keep their all-zero row and receive no mass,
        // so the prior's pseudo-counts are spread over live states only.
        let live = self.live_states();

        let mut initial_probs = self.initial_probs.clone();
        let initial_counts: Vec<f64> = live.iter().map(|&i| stats.initial_probs[i]).collect();
        if let Some(p) = priors.initial_dirichlet().mode(&initial_counts) {
            initial_probs.fill(0.0);
            for (&i, p) in live.iter().zip(p) {
                initial_probs[i] = p;
            }
        }

        let transition_prior = priors.transition_dirichlet();
        let mut transition_matrix = self.transition_matrix.clone();
        for &i in &live {
            let counts: Vec<f64> = live.iter().map(|&j| stats.trans_probs[(i, j)]).collect();
            if let Some(row) = transition_prior.mode(&counts) {
                for (&j, p) in live.iter().zip(row) {
                    transition_matrix[(i, j)] = p;
                }
            }
        }

        Ok(Self {
            initial_probs,
            transition_matrix,
            emission: self.emission.m_step(&stats.emission, priors),
        })
    }

    /// States whose transition row is not all zero.
    fn live_states(&self) -> Vec<usize> {
        (0..self.num_states())
            .filter(|&i| self.transition_matrix.row(i).iter().any(|&a| a != 0.0))
            .collect()
    }

    /// Log prior density of these parameters.
    pub fn log_prior(&self, priors: &Priors) -> f64 {
        let initial = priors.initial_dirichlet();
        let transition = priors.transition_dirichlet();
        // Densities live on the simplex of reachable states.
        let live = self.live_states();
        let mut lp = 0.0;
        if !initial.is_flat() {
            let p: Vec<f64> = live.iter().map(|&i| self.initial_probs[i]).collect();
            lp += initial.log_pdf(&p);
        }
        if !transition.is_flat() {
            for &i in &live {
                let row: Vec<f64> = live.iter().map(|&j| self.transition_matrix[(i, j)]).collect();
                lp += transition.log_pdf(&row);
            }
        }
        lp + self.emission.log_prior(priors)
    }

    /// Draw a state path and a T×D emission matrix.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        num_timesteps: usize,
    ) -> (Vec<usize>, DMatrix<f64>) {
        let mut states = Vec::with_capacity(num_timesteps);
        let mut emissions = DMatrix::zeros(num_timesteps, self.emission_dim());
        let mut prev: Option<usize> = None;
        for t in 0..num_timesteps {
            let state = match prev {
                None => sample_categorical(self.initial_probs.iter().copied(), rng),
                Some(s) => sample_categorical(self.transition_matrix.row(s).iter().copied(), rng),
            };
            for (d, x) in self.emission.sample(state, rng).into_iter().enumerate() {
                emissions[(t, d)] = x;
            }
            states.push(state);
            prev = Some(state);
        }
        (states, emissions)
    }
}

fn check_simplex(
    name: &str,
    values: impl Iterator<Item = f64>,
    allow_zero_row: bool,
) -> Result<()> {
    let mut sum = 0.0;
    for v in values {
        if !v.is_finite() || v < 0.0 {
            return Err(InferenceError::InvalidParameterShape(format!(
                "{} has invalid probability {}",
                name, v
            )));
        }
        sum += v;
    }
    if allow_zero_row && sum == 0.0 {
        return Ok(());
    }
    if (sum - 1.0).abs() > SIMPLEX_TOLERANCE {
        return Err(InferenceError::InvalidParameterShape(format!(
            "{} sums to {}, expected 1",
            name, sum
        )));
    }
    Ok(())
}

/// Inverse-CDF draw from unnormalised weights.
fn sample_categorical<R: Rng + ?Sized>(weights: impl Iterator<Item = f64>, rng: &mut R) -> usize {
    let weights: Vec<f64> = weights.collect();
    let total: f64 = weights.iter().sum();
    let mut u = rng.random::<f64>() * total;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            last_positive = i;
            if u < w {
                return i;
            }
            u -= w;
        }
    }
    last_positive
}
