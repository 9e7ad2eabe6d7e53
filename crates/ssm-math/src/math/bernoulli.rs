//! Bernoulli log-likelihood for binary emissions.
//!
//! Observations are expected in `{0, 1}`, but fractional values in `[0, 1]`
//! are accepted and scored as `x ln p + (1-x) ln(1-p)`, which is what the
//! expected-count form of the E-step produces.

use super::stable::xlogy;

/// Log-probability of observing `x` under success probability `p`.
///
/// Returns NaN for `p` outside `[0, 1]` and -inf for `x` outside `[0, 1]`.
pub fn log_pmf(x: f64, p: f64) -> f64 {
    if x.is_nan() || p.is_nan() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if !(0.0..=1.0).contains(&x) {
        return f64::NEG_INFINITY;
    }
    xlogy(x, p) + xlogy(1.0 - x, 1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn binary_outcomes() {
        assert!(approx_eq(log_pmf(1.0, 0.3), 0.3f64.ln(), 1e-15));
        assert!(approx_eq(log_pmf(0.0, 0.3), 0.7f64.ln(), 1e-15));
    }

    #[test]
    fn degenerate_probabilities() {
        assert_eq!(log_pmf(1.0, 1.0), 0.0);
        assert_eq!(log_pmf(0.0, 1.0), f64::NEG_INFINITY);
        assert_eq!(log_pmf(0.0, 0.0), 0.0);
    }

    #[test]
    fn invalid_inputs() {
        assert!(log_pmf(1.0, 1.5).is_nan());
        assert_eq!(log_pmf(2.0, 0.5), f64::NEG_INFINITY);
    }
}
