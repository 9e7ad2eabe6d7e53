//! Expectation-maximization driver.
//!
//! The driver is an explicit state machine:
//!
//! ```text
//! Initializing -> EStep -> MStep -> EStep | Converged | MaxItersReached
//! ```
//!
//! Each E-step scores the current snapshot; each M-step replaces it.
//! Convergence is judged on the log-likelihood, divergence on the
//! penalised objective (log-likelihood plus log prior), which is the
//! quantity MAP-EM never decreases.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use ssm_config::FitConfig;
use tracing::{debug, info, warn};

use super::emission::EmissionModel;
use super::model::Hmm;
use super::stats::{sum_stats, HmmStats};
use crate::diagnostics::Warning;
use crate::error::{InferenceError, Result};

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmState {
    Initializing,
    EStep,
    MStep,
    Converged,
    MaxItersReached,
}

/// Why a fit stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    MaxItersReached,
}

/// Result of [`fit_em`].
#[derive(Debug, Clone)]
pub struct EmFit<E> {
    pub model: Hmm<E>,
    /// Batch log-likelihood scored at the start of each iteration.
    pub log_likelihoods: Vec<f64>,
    /// Log-likelihood plus log prior, per iteration.
    pub objectives: Vec<f64>,
    pub termination: Termination,
    /// Number of M-steps performed.
    pub iterations: usize,
    pub warnings: Vec<Warning>,
}

/// Convergence threshold relative to the previous log-likelihood.
fn threshold(tolerance: f64, previous: f64) -> f64 {
    tolerance * previous.abs().max(1.0)
}

/// A `DivergentLikelihood` warning when the objective fell from `previous`
/// to `current` by more than the relative `tolerance`.
fn divergence(iteration: usize, previous: f64, current: f64, tolerance: f64) -> Option<Warning> {
    if previous - current > threshold(tolerance, previous) {
        Some(Warning::DivergentLikelihood {
            iteration,
            previous,
            current,
        })
    } else {
        None
    }
}

/// Fit `model` to a batch of T×D emission sequences.
pub fn fit_em<E: EmissionModel>(
    model: Hmm<E>,
    batch: &[DMatrix<f64>],
    config: &FitConfig,
) -> Result<EmFit<E>> {
    let em = &config.em;
    let priors = &config.priors;

    let mut model = model;
    let mut state = EmState::Initializing;
    let mut pending: Option<HmmStats<E::Stats>> = None;
    let mut log_likelihoods: Vec<f64> = Vec::new();
    let mut objectives: Vec<f64> = Vec::new();
    let mut warnings: Vec<Warning> = Vec::new();
    let mut iterations = 0;

    loop {
        state = match state {
            EmState::Initializing => {
                if batch.is_empty() {
                    return Err(InferenceError::EmptyBatch(
                        "fit_em needs at least one sequence".to_string(),
                    ));
                }
                if em.num_iterations == 0 {
                    return Err(InferenceError::invalid(
                        "em.num_iterations",
                        "must be at least 1",
                    ));
                }
                debug!(
                    family = E::FAMILY,
                    sequences = batch.len(),
                    num_states = model.num_states(),
                    "starting EM"
                );
                EmState::EStep
            }

            EmState::EStep => {
                let stats = sum_stats(model.e_step(batch, em.parallel)?)?;
                let ll = stats.marginal_loglik;
                let objective = ll + model.log_prior(priors);

                if let Some(&previous) = objectives.last() {
                    if let Some(warning) =
                        divergence(iterations, previous, objective, em.divergence_tolerance)
                    {
                        warn!(
                            iteration = iterations,
                            previous, current = objective, "EM objective decreased"
                        );
                        warnings.push(warning);
                    }
                }

                debug!(iteration = iterations, loglik = ll, objective, "E-step");
                log_likelihoods.push(ll);
                objectives.push(objective);
                warnings.extend(stats.warnings.iter().cloned());
                pending = Some(stats);
                EmState::MStep
            }

            EmState::MStep => {
                let stats = pending.take().ok_or_else(|| {
                    InferenceError::EmptyBatch("M-step reached without statistics".to_string())
                })?;
                model = model.m_step(&stats, priors)?;
                iterations += 1;

                let n = log_likelihoods.len();
                // Absolute change: a large drop is reported as divergence
                // and does not count as convergence.
                let plateau = n >= 2 && {
                    let (previous, current) = (log_likelihoods[n - 2], log_likelihoods[n - 1]);
                    (current - previous).abs() < threshold(em.convergence_tolerance, previous)
                };

                if plateau {
                    EmState::Converged
                } else if iterations >= em.num_iterations {
                    EmState::MaxItersReached
                } else {
                    EmState::EStep
                }
            }

            EmState::Converged | EmState::MaxItersReached => {
                let termination = if state == EmState::Converged {
                    Termination::Converged
                } else {
                    Termination::MaxItersReached
                };
                info!(
                    family = E::FAMILY,
                    iterations,
                    termination = ?termination,
                    loglik = log_likelihoods.last().copied().unwrap_or(f64::NAN),
                    warnings = warnings.len(),
                    "EM finished"
                );
                return Ok(EmFit {
                    model,
                    log_likelihoods,
                    objectives,
                    termination,
                    iterations,
                    warnings,
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::poisson::PoissonEmissions;
    use nalgebra::DVector;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use ssm_config::EmConfig;

    fn truth() -> Hmm<PoissonEmissions> {
        Hmm::new(
            DVector::from_vec(vec![0.5, 0.5]),
            DMatrix::from_row_slice(2, 2, &[0.95, 0.05, 0.05, 0.95]),
            PoissonEmissions::new(DMatrix::from_row_slice(2, 1, &[1.0, 8.0])).unwrap(),
        )
        .unwrap()
    }

    fn start() -> Hmm<PoissonEmissions> {
        Hmm::new(
            DVector::from_vec(vec![0.5, 0.5]),
            DMatrix::from_row_slice(2, 2, &[0.8, 0.2, 0.2, 0.8]),
            PoissonEmissions::new(DMatrix::from_row_slice(2, 1, &[2.0, 5.0])).unwrap(),
        )
        .unwrap()
    }

    fn batch(seed: u64) -> Vec<DMatrix<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..4).map(|_| truth().sample(&mut rng, 200).1).collect()
    }

    #[test]
    fn stops_at_max_iterations() {
        let config = FitConfig {
            em: EmConfig::default()
                .with_num_iterations(3)
                .with_convergence_tolerance(0.0),
            ..FitConfig::default()
        };
        let fit = fit_em(start(), &batch(1), &config).unwrap();
        assert_eq!(fit.termination, Termination::MaxItersReached);
        assert_eq!(fit.iterations, 3);
        assert_eq!(fit.log_likelihoods.len(), 3);
        assert_eq!(fit.objectives.len(), 3);
    }

    #[test]
    fn converges_with_loose_tolerance() {
        let config = FitConfig {
            em: EmConfig::default()
                .with_num_iterations(500)
                .with_convergence_tolerance(1e-6),
            ..FitConfig::default()
        };
        let fit = fit_em(start(), &batch(2), &config).unwrap();
        assert_eq!(fit.termination, Termination::Converged);
        assert!(fit.iterations < 500);
        assert!(fit.warnings.is_empty());
    }

    #[test]
    fn objective_never_decreases() {
        let config = FitConfig {
            em: EmConfig::default()
                .with_num_iterations(30)
                .with_convergence_tolerance(0.0),
            ..FitConfig::default()
        };
        let fit = fit_em(start(), &batch(3), &config).unwrap();
        for w in fit.objectives.windows(2) {
            assert!(w[1] >= w[0] - 1e-6 * w[0].abs().max(1.0));
        }
    }

    #[test]
    fn divergence_fires_beyond_tolerance() {
        // Tolerance is relative to max(1, |previous|): 1e-6 * 100 = 1e-4.
        assert_eq!(
            divergence(4, -100.0, -100.001, 1e-6),
            Some(Warning::DivergentLikelihood {
                iteration: 4,
                previous: -100.0,
                current: -100.001,
            })
        );
        assert_eq!(divergence(4, -100.0, -100.00005, 1e-6), None);
        assert_eq!(divergence(4, -100.0, -99.0, 1e-6), None);
        // Below |1| the threshold stays absolute.
        assert!(divergence(1, 0.5, 0.4999, 1e-3).is_none());
        assert!(divergence(1, 0.5, 0.49, 1e-3).is_some());
    }

    #[test]
    fn zero_likelihood_step_surfaces_in_fit_warnings() {
        // Zero rates cannot emit the count at t = 2.
        let model = Hmm::new(
            DVector::from_vec(vec![0.5, 0.5]),
            DMatrix::from_row_slice(2, 2, &[0.9, 0.1, 0.1, 0.9]),
            PoissonEmissions::new(DMatrix::zeros(2, 1)).unwrap(),
        )
        .unwrap();
        let emissions = DMatrix::from_column_slice(5, 1, &[0.0, 0.0, 3.0, 0.0, 1.0]);
        let config = FitConfig {
            em: EmConfig::default().with_num_iterations(5),
            ..FitConfig::default()
        };
        let fit = fit_em(model, &[emissions], &config).unwrap();
        assert!(fit
            .warnings
            .contains(&Warning::NumericalInstability { timestep: 2 }));
        assert!(fit.log_likelihoods.iter().all(|ll| ll.is_finite()));
        assert!(fit.model.emission().rates().iter().all(|&r| r > 0.0));
    }

    #[test]
    fn empty_batch_rejected() {
        let err = fit_em(start(), &[], &FitConfig::default()).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyBatch(_)));
    }
}
