//! Poisson emissions for count observation vectors.

use std::ops::Add;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use ssm_config::Priors;
use ssm_math::poisson;

use super::emission::{check_entries, state_occupancy, EmissionModel};
use crate::error::Result;

/// Independent Poisson emissions with rate `rates[(k, d)]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonEmissions {
    rates: DMatrix<f64>,
}

impl PoissonEmissions {
    /// Create from a K×D rate matrix.
    pub fn new(rates: DMatrix<f64>) -> Result<Self> {
        let emissions = Self { rates };
        emissions.validate()?;
        Ok(emissions)
    }

    pub fn rates(&self) -> &DMatrix<f64> {
        &self.rates
    }
}

/// Expected occupancy per state and expected counts per state/dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonStats {
    pub sum_w: DVector<f64>,
    pub sum_x: DMatrix<f64>,
}

impl Add for PoissonStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            sum_w: self.sum_w + rhs.sum_w,
            sum_x: self.sum_x + rhs.sum_x,
        }
    }
}

impl EmissionModel for PoissonEmissions {
    type Stats = PoissonStats;
    const FAMILY: &'static str = "poisson";

    fn num_states(&self) -> usize {
        self.rates.nrows()
    }

    fn emission_dim(&self) -> usize {
        self.rates.ncols()
    }

    fn log_likelihood(&self, state: usize, obs: &[f64]) -> f64 {
        obs.iter()
            .enumerate()
            .map(|(d, &x)| poisson::log_pmf(x, self.rates[(state, d)]))
            .sum()
    }

    fn sufficient_stats(&self, emissions: &DMatrix<f64>, weights: &DMatrix<f64>) -> PoissonStats {
        PoissonStats {
            sum_w: DVector::from_vec(state_occupancy(weights)),
            sum_x: weights.tr_mul(emissions),
        }
    }

    /// Gamma posterior mode per rate: `(sum_x + shape - 1) / (sum_w + rate)`.
    fn m_step(&self, stats: &PoissonStats, priors: &Priors) -> Self {
        let rates = DMatrix::from_fn(self.rates.nrows(), self.rates.ncols(), |k, d| {
            let post = priors.poisson.posterior(stats.sum_x[(k, d)], stats.sum_w[k]);
            let rate = post.mode();
            // A flat prior with no occupancy has no mode; keep the old rate.
            if rate.is_finite() {
                rate
            } else {
                self.rates[(k, d)]
            }
        });
        Self { rates }
    }

    fn log_prior(&self, priors: &Priors) -> f64 {
        self.rates.iter().map(|&r| priors.poisson.log_pdf(r)).sum()
    }

    fn validate(&self) -> Result<()> {
        check_entries("poisson.rates", &self.rates, "must be finite and >= 0", |r| {
            r.is_finite() && r >= 0.0
        })
    }

    fn sample<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Vec<f64> {
        self.rates
            .row(state)
            .iter()
            .map(|&rate| match Poisson::new(rate) {
                Ok(dist) => dist.sample(rng),
                // Zero rate: the only possible count is 0.
                Err(_) => 0.0,
            })
            .collect()
    }
}
