//! Discrete-state hidden Markov models.
//!
//! - [`emission`]: the per-family observation model trait
//! - [`bernoulli`], [`poisson`], [`gaussian`]: emission families
//! - [`inference`]: forward-backward, transition posteriors, Viterbi
//! - [`stats`]: expected sufficient statistics and their batch sum
//! - [`model`]: parameter snapshot with E-step / M-step / sampling
//! - [`em`]: the EM driver

pub mod bernoulli;
pub mod em;
pub mod emission;
pub mod gaussian;
pub mod inference;
pub mod model;
pub mod poisson;
pub mod stats;

pub use bernoulli::{BernoulliEmissions, BernoulliStats};
pub use em::{fit_em, EmFit, EmState, Termination};
pub use emission::EmissionModel;
pub use gaussian::{GaussianEmissions, GaussianStats};
pub use inference::{
    compute_pairwise_probs, compute_transition_probs, hmm_filter, hmm_posterior_mode,
    hmm_smoother, HmmFilterPosterior, HmmPosterior, LOGLIK_FLOOR,
};
pub use model::Hmm;
pub use poisson::{PoissonEmissions, PoissonStats};
pub use stats::{sum_stats, HmmStats};
