//! Information-form Kalman filter.
//!
//! The filtered belief is carried as `(η, Λ)` with `Λ = Σ⁻¹` and `η = Λμ`.
//! Conditioning on an observation is a plain addition in this form; the
//! prediction step needs one Cholesky solve.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use super::moment::MomentParams;
use super::{
    check_matrix_shapes, check_sequence, check_vector_shapes, cholesky, first_rows, input_at,
    spd_inverse, symmetrize, TimeVarying,
};
use crate::error::{InferenceError, Result};

/// LGSSM parameters with precisions in place of covariances.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoParams {
    pub initial_mean: DVector<f64>,
    pub initial_precision: DMatrix<f64>,
    pub dynamics_matrix: TimeVarying<DMatrix<f64>>,
    pub dynamics_precision: TimeVarying<DMatrix<f64>>,
    pub dynamics_input_weights: TimeVarying<DMatrix<f64>>,
    pub dynamics_bias: TimeVarying<DVector<f64>>,
    pub emission_matrix: TimeVarying<DMatrix<f64>>,
    pub emission_input_weights: TimeVarying<DMatrix<f64>>,
    pub emission_bias: TimeVarying<DVector<f64>>,
    pub emission_precision: TimeVarying<DMatrix<f64>>,
}

impl InfoParams {
    /// Model without inputs and with zero biases.
    pub fn new(
        initial_mean: DVector<f64>,
        initial_precision: DMatrix<f64>,
        dynamics_matrix: impl Into<TimeVarying<DMatrix<f64>>>,
        dynamics_precision: impl Into<TimeVarying<DMatrix<f64>>>,
        emission_matrix: impl Into<TimeVarying<DMatrix<f64>>>,
        emission_precision: impl Into<TimeVarying<DMatrix<f64>>>,
    ) -> Self {
        let state_dim = initial_mean.len();
        let emission_matrix = emission_matrix.into();
        let emission_dim = first_rows(&emission_matrix);
        Self {
            initial_mean,
            initial_precision,
            dynamics_matrix: dynamics_matrix.into(),
            dynamics_precision: dynamics_precision.into(),
            dynamics_input_weights: TimeVarying::Shared(DMatrix::zeros(state_dim, 0)),
            dynamics_bias: TimeVarying::Shared(DVector::zeros(state_dim)),
            emission_matrix,
            emission_input_weights: TimeVarying::Shared(DMatrix::zeros(emission_dim, 0)),
            emission_bias: TimeVarying::Shared(DVector::zeros(emission_dim)),
            emission_precision: emission_precision.into(),
        }
    }

    /// Set the input weight matrices `B` (state × input) and `D`
    /// (emission × input).
    pub fn with_inputs(
        mut self,
        dynamics_input_weights: impl Into<TimeVarying<DMatrix<f64>>>,
        emission_input_weights: impl Into<TimeVarying<DMatrix<f64>>>,
    ) -> Self {
        self.dynamics_input_weights = dynamics_input_weights.into();
        self.emission_input_weights = emission_input_weights.into();
        self
    }

    /// Set the bias vectors `b` and `d`.
    pub fn with_biases(
        mut self,
        dynamics_bias: impl Into<TimeVarying<DVector<f64>>>,
        emission_bias: impl Into<TimeVarying<DVector<f64>>>,
    ) -> Self {
        self.dynamics_bias = dynamics_bias.into();
        self.emission_bias = emission_bias.into();
        self
    }

    pub fn state_dim(&self) -> usize {
        self.initial_mean.len()
    }

    pub fn emission_dim(&self) -> usize {
        first_rows(&self.emission_matrix)
    }

    pub fn input_dim(&self) -> usize {
        self.dynamics_input_weights
            .values()
            .first()
            .map(|b| b.ncols())
            .unwrap_or(0)
    }

    /// Check shapes and that time-varying parameters cover
    /// `num_timesteps` (dynamics are only needed between steps).
    pub fn validate(&self, num_timesteps: usize) -> Result<()> {
        let (n, m, p) = (self.state_dim(), self.emission_dim(), self.input_dim());
        if self.initial_precision.shape() != (n, n) {
            return Err(InferenceError::InvalidParameterShape(format!(
                "initial_precision is {:?}, expected ({}, {})",
                self.initial_precision.shape(),
                n,
                n
            )));
        }
        check_matrix_shapes("dynamics_matrix", &self.dynamics_matrix, (n, n))?;
        check_matrix_shapes("dynamics_precision", &self.dynamics_precision, (n, n))?;
        check_matrix_shapes("dynamics_input_weights", &self.dynamics_input_weights, (n, p))?;
        check_vector_shapes("dynamics_bias", &self.dynamics_bias, n)?;
        check_matrix_shapes("emission_matrix", &self.emission_matrix, (m, n))?;
        check_matrix_shapes("emission_input_weights", &self.emission_input_weights, (m, p))?;
        check_vector_shapes("emission_bias", &self.emission_bias, m)?;
        check_matrix_shapes("emission_precision", &self.emission_precision, (m, m))?;

        let transitions = num_timesteps.saturating_sub(1);
        self.dynamics_matrix.check_covers("dynamics_matrix", transitions)?;
        self.dynamics_precision.check_covers("dynamics_precision", transitions)?;
        self.dynamics_input_weights
            .check_covers("dynamics_input_weights", transitions)?;
        self.dynamics_bias.check_covers("dynamics_bias", transitions)?;
        self.emission_matrix.check_covers("emission_matrix", num_timesteps)?;
        self.emission_input_weights
            .check_covers("emission_input_weights", num_timesteps)?;
        self.emission_bias.check_covers("emission_bias", num_timesteps)?;
        self.emission_precision
            .check_covers("emission_precision", num_timesteps)?;
        Ok(())
    }

    /// Convert covariance-form parameters by inverting every covariance.
    pub fn from_moment(params: &MomentParams) -> Result<Self> {
        Ok(Self {
            initial_mean: params.initial_mean.clone(),
            initial_precision: spd_inverse(&params.initial_covariance, 0, "initial_covariance")?,
            dynamics_matrix: params.dynamics_matrix.clone(),
            dynamics_precision: params
                .dynamics_covariance
                .try_map(|t, q| spd_inverse(q, t, "dynamics_covariance"))?,
            dynamics_input_weights: params.dynamics_input_weights.clone(),
            dynamics_bias: params.dynamics_bias.clone(),
            emission_matrix: params.emission_matrix.clone(),
            emission_input_weights: params.emission_input_weights.clone(),
            emission_bias: params.emission_bias.clone(),
            emission_precision: params
                .emission_covariance
                .try_map(|t, r| spd_inverse(r, t, "emission_covariance"))?,
        })
    }
}

/// Filtered information vectors and precisions, one per timestep.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPosterior {
    pub filtered_etas: Vec<DVector<f64>>,
    pub filtered_precisions: Vec<DMatrix<f64>>,
}

impl InfoPosterior {
    /// Filtered means: solve `Λ_t μ_t = η_t` for every step.
    pub fn filtered_means(&self) -> Result<Vec<DVector<f64>>> {
        self.filtered_etas
            .iter()
            .zip(&self.filtered_precisions)
            .enumerate()
            .map(|(t, (eta, prec))| Ok(cholesky(prec, t, "mean recovery")?.solve(eta)))
            .collect()
    }

    /// Filtered covariances `Λ_t⁻¹`.
    pub fn filtered_covariances(&self) -> Result<Vec<DMatrix<f64>>> {
        self.filtered_precisions
            .iter()
            .enumerate()
            .map(|(t, prec)| spd_inverse(prec, t, "covariance recovery"))
            .collect()
    }
}

/// Condition `(η, Λ)` on observation `y`:
/// `Λ' = Λ + HᵀRH`, `η' = η + HᵀR(y - Du - d)`.
#[allow(clippy::too_many_arguments)]
pub fn info_condition(
    eta: &DVector<f64>,
    precision: &DMatrix<f64>,
    emission_matrix: &DMatrix<f64>,
    emission_precision: &DMatrix<f64>,
    emission_input_weights: &DMatrix<f64>,
    input: &DVector<f64>,
    emission_bias: &DVector<f64>,
    emission: &DVector<f64>,
) -> (DVector<f64>, DMatrix<f64>) {
    let residual = emission - emission_input_weights * input - emission_bias;
    let ht_r = emission_matrix.transpose() * emission_precision;
    let cond_precision = precision + &ht_r * emission_matrix;
    let cond_eta = eta + ht_r * residual;
    (cond_eta, cond_precision)
}

/// Push `(η, Λ)` through the dynamics.
///
/// With `M = Λ + FᵀQF` and `K = (M⁻¹FᵀQ)ᵀ`:
/// `Λ' = (I - KFᵀ) Q (I - KFᵀ)ᵀ + KΛKᵀ` and `η' = Kη + Λ'(Bu + b)`.
/// Fails when `M` is not positive definite; the reported timestep is 0
/// and [`info_filter`] replaces it with the real one.
pub fn info_predict(
    eta: &DVector<f64>,
    precision: &DMatrix<f64>,
    dynamics_matrix: &DMatrix<f64>,
    dynamics_precision: &DMatrix<f64>,
    dynamics_input_weights: &DMatrix<f64>,
    input: &DVector<f64>,
    dynamics_bias: &DVector<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let n = precision.nrows();
    let ft_q = dynamics_matrix.transpose() * dynamics_precision;
    let m = precision + &ft_q * dynamics_matrix;
    let chol = cholesky(&m, 0, "info_predict")?;
    let gain = chol.solve(&ft_q).transpose();

    let i_kft = DMatrix::identity(n, n) - &gain * dynamics_matrix.transpose();
    let pred_precision = symmetrize(
        &i_kft * dynamics_precision * i_kft.transpose() + &gain * precision * gain.transpose(),
    );
    let offset = dynamics_input_weights * input + dynamics_bias;
    let pred_eta = &gain * eta + &pred_precision * offset;
    Ok((pred_eta, pred_precision))
}

fn at_timestep(err: InferenceError, timestep: usize) -> InferenceError {
    match err {
        InferenceError::NonPositiveDefinitePrecision { context, .. } => {
            InferenceError::NonPositiveDefinitePrecision { timestep, context }
        }
        other => other,
    }
}

/// Run the information filter over a T×m emission matrix.
///
/// `inputs` is T×p; absent inputs are treated as zeros.
pub fn info_filter(
    params: &InfoParams,
    emissions: &DMatrix<f64>,
    inputs: Option<&DMatrix<f64>>,
) -> Result<InfoPosterior> {
    let input_dim = params.input_dim();
    let num_timesteps = check_sequence(emissions, inputs, params.emission_dim(), input_dim)?;
    params.validate(num_timesteps)?;

    let mut precision = params.initial_precision.clone();
    let mut eta = &precision * &params.initial_mean;
    let mut filtered_etas = Vec::with_capacity(num_timesteps);
    let mut filtered_precisions = Vec::with_capacity(num_timesteps);

    for t in 0..num_timesteps {
        let u = input_at(inputs, t, input_dim);
        let y = emissions.row(t).transpose();
        let (cond_eta, cond_precision) = info_condition(
            &eta,
            &precision,
            params.emission_matrix.get("emission_matrix", t)?,
            params.emission_precision.get("emission_precision", t)?,
            params.emission_input_weights.get("emission_input_weights", t)?,
            &u,
            params.emission_bias.get("emission_bias", t)?,
            &y,
        );

        if t + 1 < num_timesteps {
            let (pred_eta, pred_precision) = info_predict(
                &cond_eta,
                &cond_precision,
                params.dynamics_matrix.get("dynamics_matrix", t)?,
                params.dynamics_precision.get("dynamics_precision", t)?,
                params.dynamics_input_weights.get("dynamics_input_weights", t)?,
                &u,
                params.dynamics_bias.get("dynamics_bias", t)?,
            )
            .map_err(|e| at_timestep(e, t))?;
            eta = pred_eta;
            precision = pred_precision;
        }

        filtered_etas.push(cond_eta);
        filtered_precisions.push(cond_precision);
    }

    Ok(InfoPosterior {
        filtered_etas,
        filtered_precisions,
    })
}

/// Filter independent sequences in parallel.
///
/// `inputs`, when given, must have one matrix per sequence.
pub fn info_filter_batch(
    params: &InfoParams,
    batch: &[DMatrix<f64>],
    inputs: Option<&[DMatrix<f64>]>,
) -> Result<Vec<InfoPosterior>> {
    if batch.is_empty() {
        return Err(InferenceError::EmptyBatch(
            "info_filter_batch needs at least one sequence".to_string(),
        ));
    }
    if let Some(u) = inputs {
        if u.len() != batch.len() {
            return Err(InferenceError::DimensionMismatch(format!(
                "{} input sequences for {} emission sequences",
                u.len(),
                batch.len()
            )));
        }
    }
    batch
        .par_iter()
        .enumerate()
        .map(|(i, emissions)| info_filter(params, emissions, inputs.map(|u| &u[i])))
        .collect()
}
