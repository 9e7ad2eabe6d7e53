//! Gamma and inverse-Gamma distribution utilities.
//!
//! # Parameterization
//!
//! Uses **rate parameterization**: `Gamma(α, β)` where:
//! - `α` = shape parameter (α > 0)
//! - `β` = rate parameter (β > 0)
//!
//! The density is: `f(t) = β^α / Γ(α) * t^(α-1) * e^(-βt)`
//!
//! Gamma is the conjugate prior on Poisson rates; the inverse-Gamma is the
//! variance half of the Normal-inverse-Gamma prior on Gaussian emissions.

use serde::{Deserialize, Serialize};

use super::stable::{log_gamma, xlogy};

/// Parameters of a Gamma distribution in (shape, rate) form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaParams {
    /// Shape parameter (α > 0).
    pub shape: f64,
    /// Rate parameter (β >= 0; zero gives an improper prior).
    pub rate: f64,
}

impl GammaParams {
    /// Create new Gamma parameters with validation.
    ///
    /// A zero rate is accepted so that `Gamma(1, 0)` can express a flat
    /// (improper) prior on a positive quantity.
    pub fn new(shape: f64, rate: f64) -> Option<Self> {
        if shape.is_nan() || rate.is_nan() || shape <= 0.0 || rate < 0.0 {
            return None;
        }
        Some(Self { shape, rate })
    }

    /// Flat improper prior `Gamma(1, 0)`.
    pub fn flat() -> Self {
        Self {
            shape: 1.0,
            rate: 0.0,
        }
    }

    /// Posterior after observing a total count `sum_x` over an exposure
    /// `sum_w` (both may be fractional expected values).
    pub fn posterior(&self, sum_x: f64, sum_w: f64) -> Self {
        Self {
            shape: self.shape + sum_x,
            rate: self.rate + sum_w,
        }
    }

    /// Mode of the distribution; see [`gamma_mode`].
    pub fn mode(&self) -> f64 {
        gamma_mode(self.shape, self.rate)
    }

    /// Log density at `t`.
    ///
    /// For an improper prior (zero rate) only the unnormalized
    /// `(α-1) ln t` kernel is returned.
    pub fn log_pdf(&self, t: f64) -> f64 {
        if self.rate == 0.0 {
            if t <= 0.0 {
                return f64::NEG_INFINITY;
            }
            return xlogy(self.shape - 1.0, t);
        }
        gamma_log_pdf(t, self.shape, self.rate)
    }
}

impl Default for GammaParams {
    /// Gamma(1.1, 1.1), matching the Beta(1.1, 1.1) Bernoulli prior.
    fn default() -> Self {
        Self {
            shape: 1.1,
            rate: 1.1,
        }
    }
}

/// Mode of Gamma(α, β): `(α-1)/β` for α >= 1, else 0.
///
/// Returns NaN when the rate is not strictly positive.
pub fn gamma_mode(alpha: f64, beta: f64) -> f64 {
    if alpha.is_nan() || beta.is_nan() || alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if alpha < 1.0 {
        return 0.0;
    }
    (alpha - 1.0) / beta
}

/// Log of the Gamma distribution PDF at t.
///
/// # Arguments
/// * `t` - The value at which to evaluate (t >= 0)
/// * `alpha` - Shape parameter (α > 0)
/// * `beta` - Rate parameter (β > 0)
pub fn gamma_log_pdf(t: f64, alpha: f64, beta: f64) -> f64 {
    // NaN propagation
    if t.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }

    // Parameter validation
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }

    // Domain check
    if t < 0.0 {
        return f64::NEG_INFINITY;
    }

    // Special case: t = 0
    if t == 0.0 {
        if alpha < 1.0 {
            return f64::INFINITY;
        } else if alpha == 1.0 {
            return beta.ln();
        } else {
            return f64::NEG_INFINITY;
        }
    }

    alpha * beta.ln() - log_gamma(alpha) + (alpha - 1.0) * t.ln() - beta * t
}

/// Log of the inverse-Gamma PDF at `x`:
/// `α ln β - ln Γ(α) - (α+1) ln x - β/x`.
pub fn inv_gamma_log_pdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if x.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return f64::NEG_INFINITY;
    }
    alpha * beta.ln() - log_gamma(alpha) - (alpha + 1.0) * x.ln() - beta / x
}
