//! Conjugate prior hyperparameters for the HMM M-step.

use serde::{Deserialize, Serialize};
use ssm_math::dirichlet::SymmetricDirichlet;
use ssm_math::{BetaParams, GammaParams, NigParams};

/// Prior hyperparameters shared by every emission family plus the
/// family-specific emission priors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    /// Symmetric Dirichlet concentration on the initial distribution.
    pub initial_concentration: f64,

    /// Symmetric Dirichlet concentration on each transition row.
    pub transition_concentration: f64,

    /// Beta prior on Bernoulli success probabilities.
    pub bernoulli: BetaParams,

    /// Gamma prior on Poisson rates.
    pub poisson: GammaParams,

    /// Normal-inverse-Gamma prior on Gaussian means and variances.
    pub gaussian: NigParams,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            initial_concentration: 1.0,
            transition_concentration: 1.0,
            bernoulli: BetaParams::default(),
            poisson: GammaParams::default(),
            gaussian: NigParams::default(),
        }
    }
}

impl Priors {
    /// Priors that turn every M-step into a plain maximum-likelihood update.
    ///
    /// The Gaussian prior cannot be made exactly flat; it is set to a
    /// negligible strength instead.
    pub fn flat() -> Self {
        Self {
            initial_concentration: 1.0,
            transition_concentration: 1.0,
            bernoulli: BetaParams::uniform(),
            poisson: GammaParams::flat(),
            gaussian: NigParams {
                mean: 0.0,
                mean_strength: 1e-8,
                shape: 1e-8,
                scale: 1e-8,
            },
        }
    }

    /// Dirichlet prior on the initial distribution.
    ///
    /// Falls back to the flat prior for concentrations that did not pass
    /// validation.
    pub fn initial_dirichlet(&self) -> SymmetricDirichlet {
        SymmetricDirichlet::new(self.initial_concentration).unwrap_or_default()
    }

    /// Dirichlet prior on each transition row.
    pub fn transition_dirichlet(&self) -> SymmetricDirichlet {
        SymmetricDirichlet::new(self.transition_concentration).unwrap_or_default()
    }
}
