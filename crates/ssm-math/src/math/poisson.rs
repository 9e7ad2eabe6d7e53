//! Poisson log-likelihood for count emissions.

use super::stable::log_gamma;

/// Log-probability of count `x` under rate `lambda`:
/// `x ln λ - λ - ln Γ(x + 1)`.
///
/// Counts are taken as f64 so that the same routine scores the expected
/// counts of the E-step; negative counts have probability zero.
pub fn log_pmf(x: f64, lambda: f64) -> f64 {
    if x.is_nan() || lambda.is_nan() || lambda < 0.0 {
        return f64::NAN;
    }
    if x < 0.0 {
        return f64::NEG_INFINITY;
    }
    if lambda == 0.0 {
        return if x == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    x * lambda.ln() - lambda - log_gamma(x + 1.0)
}
