//! Dirichlet prior on probability vectors.
//!
//! The HMM M-step re-estimates the initial distribution and each transition
//! row as the mode of a Dirichlet posterior:
//! - Prior: `p ~ Dirichlet(c, ..., c)` (symmetric)
//! - Expected counts `n_i` from the E-step
//! - Posterior mode: `p_i = (c - 1 + n_i) / Σ_j (c - 1 + n_j)`
//!
//! With `c = 1` this is plain normalization of the expected counts.

use super::stable::{log_gamma, xlogy};

/// Symmetric Dirichlet prior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricDirichlet {
    /// Concentration applied to every component (must be >= 1 so the
    /// posterior mode stays defined).
    pub concentration: f64,
}

impl SymmetricDirichlet {
    /// Create a symmetric prior; None unless `concentration >= 1`.
    pub fn new(concentration: f64) -> Option<Self> {
        if concentration.is_nan() || concentration < 1.0 {
            return None;
        }
        Some(Self { concentration })
    }

    /// Flat prior (c = 1).
    pub fn flat() -> Self {
        Self { concentration: 1.0 }
    }

    /// Posterior mode given expected counts.
    ///
    /// Returns None when the pseudo-counts sum to zero (no evidence and a
    /// flat prior), so the caller can keep its previous value instead of
    /// dividing by zero.
    pub fn mode(&self, counts: &[f64]) -> Option<Vec<f64>> {
        let excess = self.concentration - 1.0;
        let weights: Vec<f64> = counts.iter().map(|&n| (excess + n).max(0.0)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        Some(weights.into_iter().map(|w| w / total).collect())
    }

    /// Log density of the probability vector `p` (length K).
    pub fn log_pdf(&self, p: &[f64]) -> f64 {
        if p.is_empty() {
            return f64::NAN;
        }
        let c = self.concentration;
        let log_norm = -log_multivariate_beta(&vec![c; p.len()]);
        log_norm + p.iter().map(|&x| xlogy(c - 1.0, x)).sum::<f64>()
    }

    /// True when the prior adds no pseudo-counts.
    pub fn is_flat(&self) -> bool {
        self.concentration == 1.0
    }
}

impl Default for SymmetricDirichlet {
    fn default() -> Self {
        Self::flat()
    }
}

/// Compute log of the multivariate beta function.
///
/// log B(α) = Σ_i lgamma(α_i) - lgamma(Σ_i α_i)
pub fn log_multivariate_beta(alpha: &[f64]) -> f64 {
    if alpha.is_empty() {
        return f64::NAN;
    }
    for &a in alpha {
        if a.is_nan() || a <= 0.0 {
            return f64::NAN;
        }
    }

    let sum: f64 = alpha.iter().sum();
    let log_sum_gamma: f64 = alpha.iter().map(|&a| log_gamma(a)).sum();

    log_sum_gamma - log_gamma(sum)
}
