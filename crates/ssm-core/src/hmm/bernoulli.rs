//! Bernoulli emissions for binary observation vectors.

use std::ops::Add;

use nalgebra::DMatrix;
use rand::Rng;
use ssm_config::Priors;
use ssm_math::bernoulli;

use super::emission::{check_entries, EmissionModel};
use crate::error::Result;

/// Independent Bernoulli emissions: `probs[(k, d)]` is the chance that
/// dimension `d` fires in state `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct BernoulliEmissions {
    probs: DMatrix<f64>,
}

impl BernoulliEmissions {
    /// Create from a K×D probability matrix.
    pub fn new(probs: DMatrix<f64>) -> Result<Self> {
        let emissions = Self { probs };
        emissions.validate()?;
        Ok(emissions)
    }

    pub fn probs(&self) -> &DMatrix<f64> {
        &self.probs
    }
}

/// Expected positive and negative counts per state and dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct BernoulliStats {
    pub sum_x: DMatrix<f64>,
    pub sum_1mx: DMatrix<f64>,
}

impl Add for BernoulliStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            sum_x: self.sum_x + rhs.sum_x,
            sum_1mx: self.sum_1mx + rhs.sum_1mx,
        }
    }
}

impl EmissionModel for BernoulliEmissions {
    type Stats = BernoulliStats;
    const FAMILY: &'static str = "bernoulli";

    fn num_states(&self) -> usize {
        self.probs.nrows()
    }

    fn emission_dim(&self) -> usize {
        self.probs.ncols()
    }

    fn log_likelihood(&self, state: usize, obs: &[f64]) -> f64 {
        obs.iter()
            .enumerate()
            .map(|(d, &x)| bernoulli::log_pmf(x, self.probs[(state, d)]))
            .sum()
    }

    fn sufficient_stats(&self, emissions: &DMatrix<f64>, weights: &DMatrix<f64>) -> BernoulliStats {
        BernoulliStats {
            sum_x: weights.tr_mul(emissions),
            sum_1mx: weights.tr_mul(&emissions.map(|x| 1.0 - x)),
        }
    }

    fn m_step(&self, stats: &BernoulliStats, priors: &Priors) -> Self {
        let probs = DMatrix::from_fn(self.probs.nrows(), self.probs.ncols(), |k, d| {
            let p = priors
                .bernoulli
                .posterior(stats.sum_x[(k, d)], stats.sum_1mx[(k, d)])
                .mode();
            if p.is_finite() {
                p
            } else {
                self.probs[(k, d)]
            }
        });
        Self { probs }
    }

    fn log_prior(&self, priors: &Priors) -> f64 {
        if priors.bernoulli.is_flat() {
            return 0.0;
        }
        self.probs.iter().map(|&p| priors.bernoulli.log_pdf(p)).sum()
    }

    fn validate(&self) -> Result<()> {
        check_entries("bernoulli.probs", &self.probs, "must be in [0, 1]", |p| {
            (0.0..=1.0).contains(&p)
        })
    }

    fn sample<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> Vec<f64> {
        self.probs
            .row(state)
            .iter()
            .map(|&p| if rng.random_bool(p) { 1.0 } else { 0.0 })
            .collect()
    }
}
