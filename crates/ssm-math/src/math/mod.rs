//! Core math modules.

pub mod bernoulli;
pub mod beta;
pub mod dirichlet;
pub mod gamma;
pub mod normal;
pub mod poisson;
pub mod stable;
