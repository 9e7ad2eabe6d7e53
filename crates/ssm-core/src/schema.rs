//! JSON documents read and written by the CLI.
//!
//! Matrices travel as arrays of rows. Models carry their emission family as
//! a `family` tag; LGSSM parameters carry their parameterisation as a
//! `form` tag. The generic library types never see JSON; conversion happens
//! here, at the edge.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};
use ssm_config::{ConfigSnapshot, FitConfig};

use crate::diagnostics::Warning;
use crate::error::{InferenceError, Result};
use crate::hmm::{
    compute_transition_probs, fit_em, BernoulliEmissions, EmFit, EmissionModel, GaussianEmissions,
    Hmm, HmmPosterior, PoissonEmissions, Termination,
};
use crate::lgssm::{first_rows, InfoParams, MomentParams, TimeVarying};

/// Version stamped on every report.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Row-major matrix.
pub type Rows = Vec<Vec<f64>>;

/// Build a matrix from rows; all rows must have the same length.
pub fn matrix_from_rows(name: &str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let ncols = rows.first().map(Vec::len).unwrap_or(0);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        return Err(InferenceError::DimensionMismatch(format!(
            "{} row {} has {} entries, row 0 has {}",
            name,
            i,
            row.len(),
            ncols
        )));
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        ncols,
        rows.iter().flat_map(|r| r.iter().copied()),
    ))
}

pub fn matrix_to_rows(m: &DMatrix<f64>) -> Rows {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

fn vector_to_vec(v: &DVector<f64>) -> Vec<f64> {
    v.iter().copied().collect()
}

// ============================================================================
// HMM models
// ============================================================================

/// Emission family selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Bernoulli,
    Poisson,
    Gaussian,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Bernoulli => write!(f, "bernoulli"),
            Family::Poisson => write!(f, "poisson"),
            Family::Gaussian => write!(f, "gaussian"),
        }
    }
}

/// Emission parameters, one row per state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EmissionSpec {
    Bernoulli { probs: Rows },
    Poisson { rates: Rows },
    Gaussian { means: Rows, variances: Rows },
}

/// Serialized HMM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmSpec {
    pub initial_probs: Vec<f64>,
    pub transition_matrix: Rows,
    pub emission: EmissionSpec,
}

impl HmmSpec {
    pub fn family(&self) -> Family {
        match self.emission {
            EmissionSpec::Bernoulli { .. } => Family::Bernoulli,
            EmissionSpec::Poisson { .. } => Family::Poisson,
            EmissionSpec::Gaussian { .. } => Family::Gaussian,
        }
    }

    /// Validate and build the typed model.
    pub fn into_model(self) -> Result<AnyHmm> {
        let initial = DVector::from_vec(self.initial_probs);
        let transition = matrix_from_rows("transition_matrix", &self.transition_matrix)?;
        Ok(match self.emission {
            EmissionSpec::Bernoulli { probs } => AnyHmm::Bernoulli(Hmm::new(
                initial,
                transition,
                BernoulliEmissions::new(matrix_from_rows("probs", &probs)?)?,
            )?),
            EmissionSpec::Poisson { rates } => AnyHmm::Poisson(Hmm::new(
                initial,
                transition,
                PoissonEmissions::new(matrix_from_rows("rates", &rates)?)?,
            )?),
            EmissionSpec::Gaussian { means, variances } => AnyHmm::Gaussian(Hmm::new(
                initial,
                transition,
                GaussianEmissions::new(
                    matrix_from_rows("means", &means)?,
                    matrix_from_rows("variances", &variances)?,
                )?,
            )?),
        })
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Conversion of a family's parameters into their JSON form.
pub trait ToEmissionSpec {
    fn to_spec(&self) -> EmissionSpec;
}

impl ToEmissionSpec for BernoulliEmissions {
    fn to_spec(&self) -> EmissionSpec {
        EmissionSpec::Bernoulli {
            probs: matrix_to_rows(self.probs()),
        }
    }
}

impl ToEmissionSpec for PoissonEmissions {
    fn to_spec(&self) -> EmissionSpec {
        EmissionSpec::Poisson {
            rates: matrix_to_rows(self.rates()),
        }
    }
}

impl ToEmissionSpec for GaussianEmissions {
    fn to_spec(&self) -> EmissionSpec {
        EmissionSpec::Gaussian {
            means: matrix_to_rows(self.means()),
            variances: matrix_to_rows(self.variances()),
        }
    }
}

impl<E: EmissionModel + ToEmissionSpec> From<&Hmm<E>> for HmmSpec {
    fn from(model: &Hmm<E>) -> Self {
        HmmSpec {
            initial_probs: vector_to_vec(model.initial_probs()),
            transition_matrix: matrix_to_rows(model.transition_matrix()),
            emission: model.emission().to_spec(),
        }
    }
}

/// An HMM of any supported family.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyHmm {
    Bernoulli(Hmm<BernoulliEmissions>),
    Poisson(Hmm<PoissonEmissions>),
    Gaussian(Hmm<GaussianEmissions>),
}

macro_rules! dispatch {
    ($self:expr, $model:ident => $body:expr) => {
        match $self {
            AnyHmm::Bernoulli($model) => $body,
            AnyHmm::Poisson($model) => $body,
            AnyHmm::Gaussian($model) => $body,
        }
    };
}

/// Family-erased summary of an EM run.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: AnyHmm,
    pub log_likelihoods: Vec<f64>,
    pub objectives: Vec<f64>,
    pub termination: Termination,
    pub iterations: usize,
    pub warnings: Vec<Warning>,
}

impl FitOutcome {
    fn from_fit<E>(fit: EmFit<E>, wrap: impl FnOnce(Hmm<E>) -> AnyHmm) -> Self {
        FitOutcome {
            model: wrap(fit.model),
            log_likelihoods: fit.log_likelihoods,
            objectives: fit.objectives,
            termination: fit.termination,
            iterations: fit.iterations,
            warnings: fit.warnings,
        }
    }
}

impl AnyHmm {
    pub fn family(&self) -> Family {
        match self {
            AnyHmm::Bernoulli(_) => Family::Bernoulli,
            AnyHmm::Poisson(_) => Family::Poisson,
            AnyHmm::Gaussian(_) => Family::Gaussian,
        }
    }

    pub fn num_states(&self) -> usize {
        dispatch!(self, m => m.num_states())
    }

    pub fn emission_dim(&self) -> usize {
        dispatch!(self, m => m.emission_dim())
    }

    pub fn transition_matrix(&self) -> &DMatrix<f64> {
        dispatch!(self, m => m.transition_matrix())
    }

    pub fn to_spec(&self) -> HmmSpec {
        dispatch!(self, m => HmmSpec::from(m))
    }

    pub fn smoother(&self, emissions: &DMatrix<f64>) -> Result<HmmPosterior> {
        dispatch!(self, m => m.smoother(emissions))
    }

    pub fn most_likely_states(&self, emissions: &DMatrix<f64>) -> Result<Vec<usize>> {
        dispatch!(self, m => m.most_likely_states(emissions))
    }

    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        num_timesteps: usize,
    ) -> (Vec<usize>, DMatrix<f64>) {
        dispatch!(self, m => m.sample(rng, num_timesteps))
    }

    /// Run EM from this model.
    pub fn fit(self, batch: &[DMatrix<f64>], config: &FitConfig) -> Result<FitOutcome> {
        Ok(match self {
            AnyHmm::Bernoulli(m) => FitOutcome::from_fit(fit_em(m, batch, config)?, AnyHmm::Bernoulli),
            AnyHmm::Poisson(m) => FitOutcome::from_fit(fit_em(m, batch, config)?, AnyHmm::Poisson),
            AnyHmm::Gaussian(m) => FitOutcome::from_fit(fit_em(m, batch, config)?, AnyHmm::Gaussian),
        })
    }
}

// ============================================================================
// Emission data
// ============================================================================

/// A batch of emission sequences, each T×D.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceBatch {
    pub sequences: Vec<Rows>,
}

impl SequenceBatch {
    pub fn to_matrices(&self) -> Result<Vec<DMatrix<f64>>> {
        self.sequences
            .iter()
            .enumerate()
            .map(|(i, rows)| matrix_from_rows(&format!("sequences[{}]", i), rows))
            .collect()
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Output of `sample`; its `sequences` field is a valid [`SequenceBatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleOutput {
    pub schema_version: String,
    pub family: Family,
    pub seed: u64,
    pub states: Vec<Vec<usize>>,
    pub sequences: Vec<Rows>,
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub schema_version: String,
    pub run_id: String,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    pub family: Family,
    pub termination: Termination,
    pub iterations: usize,
    pub log_likelihoods: Vec<f64>,
    pub objectives: Vec<f64>,
    pub model: HmmSpec,
    pub warnings: Vec<Warning>,
    pub config: ConfigSnapshot,
}

impl FitReport {
    pub fn new(outcome: FitOutcome, run_id: String, config: ConfigSnapshot) -> Self {
        FitReport {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id,
            generated_at: chrono::Utc::now().to_rfc3339(),
            family: outcome.model.family(),
            termination: outcome.termination,
            iterations: outcome.iterations,
            log_likelihoods: outcome.log_likelihoods,
            objectives: outcome.objectives,
            model: outcome.model.to_spec(),
            warnings: outcome.warnings,
            config,
        }
    }
}

/// Posterior summary of one sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencePosterior {
    pub marginal_loglik: f64,
    pub smoothed_probs: Rows,
    pub most_likely_states: Vec<usize>,
    /// Expected transition counts summed over time.
    pub expected_transitions: Rows,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothReport {
    pub schema_version: String,
    pub family: Family,
    pub sequences: Vec<SequencePosterior>,
}

impl SmoothReport {
    pub fn build(model: &AnyHmm, batch: &[DMatrix<f64>]) -> Result<Self> {
        let sequences = batch
            .iter()
            .map(|emissions| {
                let posterior = model.smoother(emissions)?;
                let expected = compute_transition_probs(model.transition_matrix(), &posterior)?;
                Ok(SequencePosterior {
                    marginal_loglik: posterior.marginal_loglik,
                    smoothed_probs: matrix_to_rows(&posterior.smoothed_probs),
                    most_likely_states: model.most_likely_states(emissions)?,
                    expected_transitions: matrix_to_rows(&expected),
                    warnings: posterior.warnings,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SmoothReport {
            schema_version: SCHEMA_VERSION.to_string(),
            family: model.family(),
            sequences,
        })
    }
}

// ============================================================================
// LGSSM
// ============================================================================

/// A matrix shared by all steps, or one per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatrixSeries {
    Shared(Rows),
    PerTimestep(Vec<Rows>),
}

impl MatrixSeries {
    fn to_time_varying(&self, name: &str) -> Result<TimeVarying<DMatrix<f64>>> {
        Ok(match self {
            MatrixSeries::Shared(rows) => TimeVarying::Shared(matrix_from_rows(name, rows)?),
            MatrixSeries::PerTimestep(steps) => TimeVarying::PerTimestep(
                steps
                    .iter()
                    .map(|rows| matrix_from_rows(name, rows))
                    .collect::<Result<Vec<_>>>()?,
            ),
        })
    }
}

/// A vector shared by all steps, or one per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorSeries {
    Shared(Vec<f64>),
    PerTimestep(Vec<Vec<f64>>),
}

impl VectorSeries {
    fn to_time_varying(&self) -> TimeVarying<DVector<f64>> {
        match self {
            VectorSeries::Shared(v) => TimeVarying::Shared(DVector::from_column_slice(v)),
            VectorSeries::PerTimestep(vs) => TimeVarying::PerTimestep(
                vs.iter().map(|v| DVector::from_column_slice(v)).collect(),
            ),
        }
    }
}

/// Optional input weights and biases shared by both forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LgssmOffsets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamics_input_weights: Option<MatrixSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamics_bias: Option<VectorSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emission_input_weights: Option<MatrixSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emission_bias: Option<VectorSeries>,
}

/// Serialized LGSSM parameters in either form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum LgssmSpec {
    Info {
        initial_mean: Vec<f64>,
        initial_precision: Rows,
        dynamics_matrix: MatrixSeries,
        dynamics_precision: MatrixSeries,
        emission_matrix: MatrixSeries,
        emission_precision: MatrixSeries,
        #[serde(flatten)]
        offsets: LgssmOffsets,
    },
    Moment {
        initial_mean: Vec<f64>,
        initial_covariance: Rows,
        dynamics_matrix: MatrixSeries,
        dynamics_covariance: MatrixSeries,
        emission_matrix: MatrixSeries,
        emission_covariance: MatrixSeries,
        #[serde(flatten)]
        offsets: LgssmOffsets,
    },
}

/// Zero matrices of the right shape for absent input weights.
fn zero_weights(rows: usize, input_dim: usize) -> TimeVarying<DMatrix<f64>> {
    TimeVarying::Shared(DMatrix::zeros(rows, input_dim))
}

fn zero_bias(len: usize) -> TimeVarying<DVector<f64>> {
    TimeVarying::Shared(DVector::zeros(len))
}

struct Offsets {
    dynamics_input_weights: TimeVarying<DMatrix<f64>>,
    dynamics_bias: TimeVarying<DVector<f64>>,
    emission_input_weights: TimeVarying<DMatrix<f64>>,
    emission_bias: TimeVarying<DVector<f64>>,
}

impl LgssmOffsets {
    fn resolve(&self, state_dim: usize, emission_dim: usize, input_dim: usize) -> Result<Offsets> {
        Ok(Offsets {
            dynamics_input_weights: match &self.dynamics_input_weights {
                Some(s) => s.to_time_varying("dynamics_input_weights")?,
                None => zero_weights(state_dim, input_dim),
            },
            dynamics_bias: self
                .dynamics_bias
                .as_ref()
                .map(VectorSeries::to_time_varying)
                .unwrap_or_else(|| zero_bias(state_dim)),
            emission_input_weights: match &self.emission_input_weights {
                Some(s) => s.to_time_varying("emission_input_weights")?,
                None => zero_weights(emission_dim, input_dim),
            },
            emission_bias: self
                .emission_bias
                .as_ref()
                .map(VectorSeries::to_time_varying)
                .unwrap_or_else(|| zero_bias(emission_dim)),
        })
    }
}

impl LgssmSpec {
    pub fn form(&self) -> &'static str {
        match self {
            LgssmSpec::Info { .. } => "info",
            LgssmSpec::Moment { .. } => "moment",
        }
    }

    /// Build information-form parameters; `input_dim` sizes any absent
    /// input weights.
    pub fn to_info_params(&self, input_dim: usize) -> Result<InfoParams> {
        match self {
            LgssmSpec::Info {
                initial_mean,
                initial_precision,
                dynamics_matrix,
                dynamics_precision,
                emission_matrix,
                emission_precision,
                offsets,
            } => {
                let emission_matrix = emission_matrix.to_time_varying("emission_matrix")?;
                let emission_dim = first_rows(&emission_matrix);
                let o = offsets.resolve(initial_mean.len(), emission_dim, input_dim)?;
                Ok(InfoParams::new(
                    DVector::from_column_slice(initial_mean),
                    matrix_from_rows("initial_precision", initial_precision)?,
                    dynamics_matrix.to_time_varying("dynamics_matrix")?,
                    dynamics_precision.to_time_varying("dynamics_precision")?,
                    emission_matrix,
                    emission_precision.to_time_varying("emission_precision")?,
                )
                .with_inputs(o.dynamics_input_weights, o.emission_input_weights)
                .with_biases(o.dynamics_bias, o.emission_bias))
            }
            LgssmSpec::Moment { .. } => InfoParams::from_moment(&self.to_moment_params(input_dim)?),
        }
    }

    /// Covariance-form parameters; only available for the `moment` form.
    pub fn to_moment_params(&self, input_dim: usize) -> Result<MomentParams> {
        match self {
            LgssmSpec::Moment {
                initial_mean,
                initial_covariance,
                dynamics_matrix,
                dynamics_covariance,
                emission_matrix,
                emission_covariance,
                offsets,
            } => {
                let emission_matrix = emission_matrix.to_time_varying("emission_matrix")?;
                let emission_dim = first_rows(&emission_matrix);
                let o = offsets.resolve(initial_mean.len(), emission_dim, input_dim)?;
                Ok(MomentParams::new(
                    DVector::from_column_slice(initial_mean),
                    matrix_from_rows("initial_covariance", initial_covariance)?,
                    dynamics_matrix.to_time_varying("dynamics_matrix")?,
                    dynamics_covariance.to_time_varying("dynamics_covariance")?,
                    emission_matrix,
                    emission_covariance.to_time_varying("emission_covariance")?,
                )
                .with_inputs(o.dynamics_input_weights, o.emission_input_weights)
                .with_biases(o.dynamics_bias, o.emission_bias))
            }
            LgssmSpec::Info { .. } => Err(InferenceError::invalid(
                "form",
                "covariance-form parameters requested from an info-form model",
            )),
        }
    }
}

/// Input document of the `filter` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterInput {
    pub params: LgssmSpec,
    pub emissions: Rows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Rows>,
}

impl FilterInput {
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterReport {
    pub schema_version: String,
    pub form: String,
    /// Only computed for covariance-form input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marginal_loglik: Option<f64>,
    pub filtered_means: Rows,
    pub filtered_covariances: Vec<Rows>,
}
