//! Forward-backward smoothing, transition posteriors, and Viterbi decoding
//! for discrete-state HMMs.
//!
//! # Scaling
//!
//! Messages are kept normalised. At step t the predicted distribution
//! (π at t = 0, `α_{t-1}ᵀA` afterwards) is multiplied by the shifted
//! likelihood `exp(ll_t - max ll_t)` and renormalised by `c_t`, so
//! `ln p(y_t | y_{<t}) = ln c_t + max ll_t`. Backward messages use the same
//! normalisers: `β_{T-1} = 1`, `β_t = A (like_{t+1} ∘ β_{t+1}) / c_{t+1}`.
//! With this scaling `α_t ∘ β_t` is already the smoothed marginal and the
//! pairwise posteriors of each step sum to one.

use nalgebra::{DMatrix, DVector};
use ssm_math::normalize_in_place;
use tracing::warn;

use crate::diagnostics::Warning;
use crate::error::{InferenceError, Result};

/// Log-likelihood substituted for every state at a step where no state can
/// explain the observation.
pub const LOGLIK_FLOOR: f64 = -1e4;

/// Output of the forward pass.
#[derive(Debug, Clone)]
pub struct HmmFilterPosterior {
    pub marginal_loglik: f64,
    /// Per-step `ln p(y_t | y_{<t})`.
    pub log_normalizers: Vec<f64>,
    /// T×K filtered distributions `p(z_t | y_{≤t})`.
    pub filtered_probs: DMatrix<f64>,
    pub warnings: Vec<Warning>,
}

/// Output of forward-backward smoothing.
#[derive(Debug, Clone)]
pub struct HmmPosterior {
    pub marginal_loglik: f64,
    pub log_normalizers: Vec<f64>,
    pub filtered_probs: DMatrix<f64>,
    /// T×K smoothed marginals `p(z_t | y_{1:T})`.
    pub smoothed_probs: DMatrix<f64>,
    /// T×K scaled backward messages.
    pub backward_messages: DMatrix<f64>,
    /// T×K max-shifted likelihoods actually used by the recursions.
    pub scaled_likelihoods: DMatrix<f64>,
    /// Per-step normalisers `c_t` of the scaled forward pass.
    pub normalizers: Vec<f64>,
    pub warnings: Vec<Warning>,
}

struct ForwardPass {
    filtered: DMatrix<f64>,
    scaled_likelihoods: DMatrix<f64>,
    normalizers: Vec<f64>,
    log_normalizers: Vec<f64>,
    warnings: Vec<Warning>,
}

fn check_shapes(
    initial_probs: &DVector<f64>,
    transition_matrix: &DMatrix<f64>,
    conditional_logliks: &DMatrix<f64>,
) -> Result<(usize, usize)> {
    let k = initial_probs.len();
    if transition_matrix.shape() != (k, k) {
        return Err(InferenceError::InvalidParameterShape(format!(
            "transition matrix is {:?}, expected ({}, {})",
            transition_matrix.shape(),
            k,
            k
        )));
    }
    if conditional_logliks.ncols() != k {
        return Err(InferenceError::DimensionMismatch(format!(
            "log-likelihoods have {} columns for {} states",
            conditional_logliks.ncols(),
            k
        )));
    }
    let t = conditional_logliks.nrows();
    if t == 0 {
        return Err(InferenceError::DimensionMismatch(
            "sequence has no timesteps".to_string(),
        ));
    }
    Ok((t, k))
}

fn forward(
    initial_probs: &DVector<f64>,
    transition_matrix: &DMatrix<f64>,
    conditional_logliks: &DMatrix<f64>,
) -> Result<ForwardPass> {
    let (num_timesteps, num_states) =
        check_shapes(initial_probs, transition_matrix, conditional_logliks)?;

    let mut filtered = DMatrix::zeros(num_timesteps, num_states);
    let mut scaled = DMatrix::zeros(num_timesteps, num_states);
    let mut normalizers = Vec::with_capacity(num_timesteps);
    let mut log_normalizers = Vec::with_capacity(num_timesteps);
    let mut warnings = Vec::new();

    let mut predicted: Vec<f64> = initial_probs.iter().copied().collect();
    let mut like = vec![0.0; num_states];
    let mut alpha = vec![0.0; num_states];

    for t in 0..num_timesteps {
        let row = conditional_logliks.row(t);
        let max_ll = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for (k, l) in like.iter_mut().enumerate() {
            *l = (row[k] - max_ll).exp();
        }
        for k in 0..num_states {
            alpha[k] = predicted[k] * like[k];
        }
        let mut c = alpha.iter().sum::<f64>();
        let mut shift = max_ll;

        if !(c.is_finite() && c > 0.0 && max_ll.is_finite()) {
            warn!(timestep = t, "zero likelihood under every state; flooring step");
            warnings.push(Warning::NumericalInstability { timestep: t });
            if predicted.iter().sum::<f64>() <= 0.0 {
                predicted.fill(1.0 / num_states as f64);
            }
            like.fill(1.0);
            alpha.copy_from_slice(&predicted);
            c = alpha.iter().sum::<f64>();
            shift = LOGLIK_FLOOR;
        }

        for k in 0..num_states {
            alpha[k] /= c;
            filtered[(t, k)] = alpha[k];
            scaled[(t, k)] = like[k];
        }
        normalizers.push(c);
        log_normalizers.push(c.ln() + shift);

        // predicted_{t+1}(j) = Σ_i α_t(i) A(i, j)
        for (j, p) in predicted.iter_mut().enumerate() {
            *p = (0..num_states)
                .map(|i| alpha[i] * transition_matrix[(i, j)])
                .sum();
        }
    }

    Ok(ForwardPass {
        filtered,
        scaled_likelihoods: scaled,
        normalizers,
        log_normalizers,
        warnings,
    })
}

/// Forward filtering only.
pub fn hmm_filter(
    initial_probs: &DVector<f64>,
    transition_matrix: &DMatrix<f64>,
    conditional_logliks: &DMatrix<f64>,
) -> Result<HmmFilterPosterior> {
    let fwd = forward(initial_probs, transition_matrix, conditional_logliks)?;
    Ok(HmmFilterPosterior {
        marginal_loglik: fwd.log_normalizers.iter().sum(),
        log_normalizers: fwd.log_normalizers,
        filtered_probs: fwd.filtered,
        warnings: fwd.warnings,
    })
}

/// Forward-backward smoothing.
///
/// `conditional_logliks` is T×K with entry `(t, k) = ln p(y_t | z_t = k)`.
pub fn hmm_smoother(
    initial_probs: &DVector<f64>,
    transition_matrix: &DMatrix<f64>,
    conditional_logliks: &DMatrix<f64>,
) -> Result<HmmPosterior> {
    let fwd = forward(initial_probs, transition_matrix, conditional_logliks)?;
    let (num_timesteps, num_states) = fwd.filtered.shape();

    let mut backward = DMatrix::from_element(num_timesteps, num_states, 1.0);
    for t in (0..num_timesteps.saturating_sub(1)).rev() {
        let c_next = fwd.normalizers[t + 1];
        for i in 0..num_states {
            let mut acc = 0.0;
            for j in 0..num_states {
                acc += transition_matrix[(i, j)]
                    * fwd.scaled_likelihoods[(t + 1, j)]
                    * backward[(t + 1, j)];
            }
            backward[(t, i)] = acc / c_next;
        }
    }

    let mut smoothed = fwd.filtered.component_mul(&backward);
    let mut row = vec![0.0; num_states];
    for t in 0..num_timesteps {
        for (k, v) in row.iter_mut().enumerate() {
            *v = smoothed[(t, k)];
        }
        normalize_in_place(&mut row);
        for (k, v) in row.iter().enumerate() {
            smoothed[(t, k)] = *v;
        }
    }

    Ok(HmmPosterior {
        marginal_loglik: fwd.log_normalizers.iter().sum(),
        log_normalizers: fwd.log_normalizers,
        filtered_probs: fwd.filtered,
        smoothed_probs: smoothed,
        backward_messages: backward,
        scaled_likelihoods: fwd.scaled_likelihoods,
        normalizers: fwd.normalizers,
        warnings: fwd.warnings,
    })
}

fn pairwise_at(
    transition_matrix: &DMatrix<f64>,
    posterior: &HmmPosterior,
    t: usize,
    out: &mut DMatrix<f64>,
) {
    let num_states = transition_matrix.nrows();
    let c_next = posterior.normalizers[t + 1];
    for i in 0..num_states {
        let a = posterior.filtered_probs[(t, i)];
        for j in 0..num_states {
            out[(i, j)] += a
                * transition_matrix[(i, j)]
                * posterior.scaled_likelihoods[(t + 1, j)]
                * posterior.backward_messages[(t + 1, j)]
                / c_next;
        }
    }
}

fn check_posterior(transition_matrix: &DMatrix<f64>, posterior: &HmmPosterior) -> Result<()> {
    let k = posterior.filtered_probs.ncols();
    if transition_matrix.shape() != (k, k) {
        return Err(InferenceError::InvalidParameterShape(format!(
            "transition matrix is {:?} for a {}-state posterior",
            transition_matrix.shape(),
            k
        )));
    }
    Ok(())
}

/// Expected transition counts `Σ_t p(z_t = i, z_{t+1} = j | y)` (K×K).
///
/// The entries sum to T-1.
pub fn compute_transition_probs(
    transition_matrix: &DMatrix<f64>,
    posterior: &HmmPosterior,
) -> Result<DMatrix<f64>> {
    check_posterior(transition_matrix, posterior)?;
    let k = transition_matrix.nrows();
    let mut counts = DMatrix::zeros(k, k);
    for t in 0..posterior.normalizers.len().saturating_sub(1) {
        pairwise_at(transition_matrix, posterior, t, &mut counts);
    }
    Ok(counts)
}

/// Per-step pairwise posteriors `p(z_t = i, z_{t+1} = j | y)`, one K×K
/// matrix for each of the T-1 transitions.
pub fn compute_pairwise_probs(
    transition_matrix: &DMatrix<f64>,
    posterior: &HmmPosterior,
) -> Result<Vec<DMatrix<f64>>> {
    check_posterior(transition_matrix, posterior)?;
    let k = transition_matrix.nrows();
    Ok((0..posterior.normalizers.len().saturating_sub(1))
        .map(|t| {
            let mut xi = DMatrix::zeros(k, k);
            pairwise_at(transition_matrix, posterior, t, &mut xi);
            xi
        })
        .collect())
}

/// Most likely state path (Viterbi), computed in log space.
///
/// Ties go to the lowest state index.
pub fn hmm_posterior_mode(
    initial_probs: &DVector<f64>,
    transition_matrix: &DMatrix<f64>,
    conditional_logliks: &DMatrix<f64>,
) -> Result<Vec<usize>> {
    let (num_timesteps, num_states) =
        check_shapes(initial_probs, transition_matrix, conditional_logliks)?;
    let log_a = transition_matrix.map(f64::ln);

    let mut scores: Vec<f64> = (0..num_states)
        .map(|k| initial_probs[k].ln() + conditional_logliks[(0, k)])
        .collect();
    let mut backpointers = vec![vec![0usize; num_states]; num_timesteps];
    let mut next = vec![0.0; num_states];

    for t in 1..num_timesteps {
        for j in 0..num_states {
            let mut best = f64::NEG_INFINITY;
            let mut arg = 0;
            for (i, &s) in scores.iter().enumerate() {
                let cand = s + log_a[(i, j)];
                if cand > best {
                    best = cand;
                    arg = i;
                }
            }
            next[j] = best + conditional_logliks[(t, j)];
            backpointers[t][j] = arg;
        }
        std::mem::swap(&mut scores, &mut next);
    }

    let mut state = argmax(&scores);
    let mut path = vec![0; num_timesteps];
    path[num_timesteps - 1] = state;
    for t in (1..num_timesteps).rev() {
        state = backpointers[t][state];
        path[t - 1] = state;
    }
    Ok(path)
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
