//! Diagonal Gaussian emissions for real-valued observation vectors.

use std::ops::Add;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use ssm_config::Priors;
use ssm_math::normal_log_pdf;

use super::emission::{check_entries, state_occupancy, EmissionModel};
use crate::error::{InferenceError, Result};

/// Gaussian emissions with per-state means and diagonal variances.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianEmissions {
    means: DMatrix<f64>,
    variances: DMatrix<f64>,
}

impl GaussianEmissions {
    /// Create from K×D mean and variance matrices.
    pub fn new(means: DMatrix<f64>, variances: DMatrix<f64>) -> Result<Self> {
        if means.shape() != variances.shape() {
            return Err(InferenceError::InvalidParameterShape(format!(
                "gaussian means are {:?} but variances are {:?}",
                means.shape(),
                variances.shape()
            )));
        }
        let emissions = Self { means, variances };
        emissions.validate()?;
        Ok(emissions)
    }

    pub fn means(&self) -> &DMatrix<f64> {
        &self.means
    }

    pub fn variances(&self) -> &DMatrix<f64> {
        &self.variances
    }
}

/// Weighted zeroth, first and second moments per state.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianStats {
    pub sum_w: DVector<f64>,
    pub sum_x: DMatrix<f64>,
    pub sum_xx: DMatrix<f64>,
}

impl Add for GaussianStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            sum_w: self.sum_w + rhs.sum_w,
            sum_x: self.sum_x + rhs.sum_x,
            sum_xx: self.sum_xx + rhs.sum_xx,
        }
    }
}

impl EmissionModel for GaussianEmissions {
    type Stats = GaussianStats;
    const FAMILY: &'static str = "gaussian";

    fn num_states(&self) -> usize {
        self.means.nrows()
    }

    fn emission_dim(&self) -> usize {
        self.means.ncols()
    }

    fn log_likelihood(&self, state: usize, obs: &[f64]) -> f64 {
        obs.iter()
            .enumerate()
            .map(|(d, &x)| normal_log_pdf(x, self.means[(state, d)], self.variances[(state, d)]))
            .sum()
    }

    fn sufficient_stats(&self, emissions: &DMatrix<f64>, weights: &DMatrix<f64>) -> GaussianStats {
        GaussianStats {
            sum_w: DVector::from_vec(state_occupancy(weights)),
            sum_x: weights.tr_mul(emissions),
            sum_xx: weights.tr_mul(&emissions.map(|x| x * x)),
        }
    }

    fn m_step(&self, stats: &GaussianStats, priors: &Priors) -> Self {
        let (k_states, dim) = self.means.shape();
        let mut means = self.means.clone();
        let mut variances = self.variances.clone();
        for k in 0..k_states {
            for d in 0..dim {
                let post = priors
                    .gaussian
                    .posterior(stats.sum_w[k], stats.sum_x[(k, d)], stats.sum_xx[(k, d)]);
                let (mean, var) = post.mode();
                if mean.is_finite() && var.is_finite() && var > 0.0 {
                    means[(k, d)] = mean;
                    variances[(k, d)] = var;
                }
            }
        }
        Self { means, variances }
    }

    fn log_prior(&self, priors: &Priors) -> f64 {
        self.means
            .iter()
            .zip(self.variances.iter())
            .map(|(&m, &v)| priors.gaussian.log_pdf(m, v))
            .sum()
    }

    fn validate(&self) -> Result<()> {
        check_entries("gaussian.means", &self.means, "must be finite", f64::is_finite)?;
        check_entries(
            "gaussian.variances",
            &self.variances,
            "must be finite and > 0",
            |v| v.is_finite() && v > 0.0,
        )
    }

    fn sample<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Vec<f64> {
        (0..self.emission_dim())
            .map(|d| {
                let mean = self.means[(state, d)];
                match Normal::new(mean, self.variances[(state, d)].sqrt()) {
                    Ok(dist) => dist.sample(rng),
                    Err(_) => mean,
                }
            })
            .collect()
    }
}
