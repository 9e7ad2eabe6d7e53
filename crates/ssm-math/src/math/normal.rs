//! Normal log density and the Normal-inverse-Gamma conjugate prior.
//!
//! NIG(μ, σ² | μ₀, κ₀, α₀, β₀) factorises as
//! `σ² ~ InvGamma(α₀, β₀)` and `μ | σ² ~ N(μ₀, σ²/κ₀)`.

use serde::{Deserialize, Serialize};

use super::gamma::inv_gamma_log_pdf;

const LOG_2PI: f64 = 1.837_877_066_409_345_3; // ln(2*pi)

/// Log density of N(mean, variance) at `x`.
pub fn normal_log_pdf(x: f64, mean: f64, variance: f64) -> f64 {
    if x.is_nan() || mean.is_nan() || variance.is_nan() || variance <= 0.0 {
        return f64::NAN;
    }
    let diff = x - mean;
    -0.5 * (LOG_2PI + variance.ln() + diff * diff / variance)
}

/// Normal-inverse-Gamma hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NigParams {
    /// Prior mean μ₀.
    pub mean: f64,
    /// Pseudo-observation count behind μ₀ (κ₀ > 0).
    pub mean_strength: f64,
    /// Inverse-Gamma shape α₀ (> 0).
    pub shape: f64,
    /// Inverse-Gamma scale β₀ (> 0).
    pub scale: f64,
}

impl NigParams {
    /// Create NIG parameters with validation.
    pub fn new(mean: f64, mean_strength: f64, shape: f64, scale: f64) -> Option<Self> {
        if !mean.is_finite() {
            return None;
        }
        for v in [mean_strength, shape, scale] {
            if v.is_nan() || v <= 0.0 {
                return None;
            }
        }
        Some(Self {
            mean,
            mean_strength,
            shape,
            scale,
        })
    }

    /// Posterior after weighted observations summarised by total weight
    /// `sum_w`, weighted sum `sum_x` and weighted sum of squares `sum_xx`.
    pub fn posterior(&self, sum_w: f64, sum_x: f64, sum_xx: f64) -> Self {
        if sum_w <= 0.0 {
            return *self;
        }
        let x_bar = sum_x / sum_w;
        // Weighted scatter around the sample mean, clamped against rounding.
        let scatter = (sum_xx - sum_w * x_bar * x_bar).max(0.0);
        let kappa_n = self.mean_strength + sum_w;
        let mean_n = (self.mean_strength * self.mean + sum_x) / kappa_n;
        let shift = x_bar - self.mean;
        Self {
            mean: mean_n,
            mean_strength: kappa_n,
            shape: self.shape + 0.5 * sum_w,
            scale: self.scale
                + 0.5 * scatter
                + 0.5 * self.mean_strength * sum_w * shift * shift / kappa_n,
        }
    }

    /// Joint mode `(μ, σ²) = (μ₀, β₀ / (α₀ + 3/2))`.
    pub fn mode(&self) -> (f64, f64) {
        (self.mean, self.scale / (self.shape + 1.5))
    }

    /// Joint log density at `(mean, variance)`.
    pub fn log_pdf(&self, mean: f64, variance: f64) -> f64 {
        if variance <= 0.0 {
            return f64::NEG_INFINITY;
        }
        inv_gamma_log_pdf(variance, self.shape, self.scale)
            + normal_log_pdf(mean, self.mean, variance / self.mean_strength)
    }
}

impl Default for NigParams {
    /// Weak prior: μ₀ = 0 backed by 0.01 pseudo-observations, σ² ~ IG(1.1, 0.1).
    fn default() -> Self {
        Self {
            mean: 0.0,
            mean_strength: 0.01,
            shape: 1.1,
            scale: 0.1,
        }
    }
}
