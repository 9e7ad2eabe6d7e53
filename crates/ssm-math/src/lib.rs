//! Scalar math for state-space inference.
//!
//! Log-domain helpers plus the log densities and conjugate posterior modes
//! used by the HMM emission families and their priors.

pub mod math;

pub use math::bernoulli;
pub use math::beta::*;
pub use math::dirichlet;
pub use math::gamma::*;
pub use math::normal::*;
pub use math::poisson;
pub use math::stable::*;
