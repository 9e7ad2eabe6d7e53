//! Beta distribution: log density, mode, and conjugate updates.
//!
//! Used as the conjugate prior on Bernoulli emission probabilities. The
//! M-step only ever needs the posterior mode, so no CDF machinery lives here.

use serde::{Deserialize, Serialize};

use super::stable::log_beta;

/// Parameters of a Beta distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaParams {
    /// Concentration on successes (alpha > 0).
    pub alpha: f64,
    /// Concentration on failures (beta > 0).
    pub beta: f64,
}

impl BetaParams {
    /// Create new Beta parameters with validation.
    ///
    /// Returns None if parameters are invalid (non-positive or NaN).
    pub fn new(alpha: f64, beta: f64) -> Option<Self> {
        if alpha.is_nan() || beta.is_nan() || alpha <= 0.0 || beta <= 0.0 {
            return None;
        }
        Some(Self { alpha, beta })
    }

    /// Create Beta(1, 1) uniform prior.
    pub fn uniform() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }

    /// Posterior after observing `successes` and `failures` (both may be
    /// fractional expected counts).
    pub fn posterior(&self, successes: f64, failures: f64) -> Self {
        Self {
            alpha: self.alpha + successes,
            beta: self.beta + failures,
        }
    }

    /// Mean E[p] = α / (α + β).
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Mode of the distribution; see [`beta_mode`].
    pub fn mode(&self) -> f64 {
        beta_mode(self.alpha, self.beta)
    }

    /// Log density at `x`.
    pub fn log_pdf(&self, x: f64) -> f64 {
        log_beta_pdf(x, self.alpha, self.beta)
    }

    /// True when the density is flat, i.e. the prior contributes nothing.
    pub fn is_flat(&self) -> bool {
        self.alpha == 1.0 && self.beta == 1.0
    }
}

impl Default for BetaParams {
    /// Beta(1.1, 1.1): a weak prior that keeps modes off the boundary.
    fn default() -> Self {
        Self {
            alpha: 1.1,
            beta: 1.1,
        }
    }
}

/// Mode of Beta(alpha, beta).
///
/// Interior `(α-1)/(α+β-2)` when both parameters exceed 1. Otherwise the
/// density peaks on the boundary: 0 when α < β, 1 when α > β, and 0.5 for
/// symmetric cases (including the flat Beta(1, 1)).
pub fn beta_mode(alpha: f64, beta: f64) -> f64 {
    if alpha.is_nan() || beta.is_nan() || alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if alpha > 1.0 && beta > 1.0 {
        return (alpha - 1.0) / (alpha + beta - 2.0);
    }
    if alpha == beta {
        0.5
    } else if alpha < beta {
        0.0
    } else {
        1.0
    }
}

/// Log of the Beta PDF at x.
pub fn log_beta_pdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if x.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if !(0.0..=1.0).contains(&x) {
        return f64::NEG_INFINITY;
    }
    if x == 0.0 {
        if alpha < 1.0 {
            return f64::INFINITY;
        }
        if alpha > 1.0 {
            return f64::NEG_INFINITY;
        }
        return -log_beta(1.0, beta);
    }
    if x == 1.0 {
        if beta < 1.0 {
            return f64::INFINITY;
        }
        if beta > 1.0 {
            return f64::NEG_INFINITY;
        }
        return -log_beta(alpha, 1.0);
    }
    let log_x = x.ln();
    let log_one_minus = (-x).ln_1p();
    (alpha - 1.0) * log_x + (beta - 1.0) * log_one_minus - log_beta(alpha, beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn beta_params_new_invalid() {
        assert!(BetaParams::new(0.0, 1.0).is_none());
        assert!(BetaParams::new(1.0, -1.0).is_none());
        assert!(BetaParams::new(f64::NAN, 1.0).is_none());
    }

    #[test]
    fn default_prior_mode_matches_offsets() {
        // (pos + 0.1) / (pos + neg + 0.2) for the Beta(1.1, 1.1) prior.
        let post = BetaParams::default().posterior(7.0, 3.0);
        assert!(approx_eq(post.mode(), 7.1 / 10.2, 1e-12));
    }

    #[test]
    fn mode_boundaries() {
        assert_eq!(beta_mode(1.0, 1.0), 0.5);
        assert_eq!(beta_mode(1.0, 3.0), 0.0);
        assert_eq!(beta_mode(3.0, 1.0), 1.0);
        assert!(beta_mode(-1.0, 1.0).is_nan());
    }

    #[test]
    fn uniform_log_pdf_is_zero() {
        let p = BetaParams::uniform();
        assert!(p.is_flat());
        assert!(approx_eq(p.log_pdf(0.3), 0.0, 1e-12));
    }

    #[test]
    fn log_pdf_outside_support() {
        assert_eq!(log_beta_pdf(1.5, 2.0, 2.0), f64::NEG_INFINITY);
        assert_eq!(log_beta_pdf(0.0, 2.0, 2.0), f64::NEG_INFINITY);
    }

    #[test]
    fn log_pdf_known_value() {
        // Beta(2, 2) density is 6x(1-x); at 0.5 that is 1.5.
        assert!(approx_eq(log_beta_pdf(0.5, 2.0, 2.0), 1.5f64.ln(), 1e-10));
    }
}
