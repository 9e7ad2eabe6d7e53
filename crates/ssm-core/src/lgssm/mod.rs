//! Linear-Gaussian state-space models.
//!
//! ```text
//! z_0     ~ N(μ_0, Λ_0⁻¹)
//! z_{t+1} = F_t z_t + B_t u_t + b_t + w_t,   w_t ~ N(0, Q_t⁻¹)
//! y_t     = H_t z_t + D_t u_t + d_t + v_t,   v_t ~ N(0, R_t⁻¹)
//! ```
//!
//! [`info`] filters in information form (precision Λ, information vector
//! η = Λμ). [`moment`] is the covariance-form equivalent.

pub mod info;
pub mod moment;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::error::{InferenceError, Result};

pub use info::{
    info_condition, info_filter, info_filter_batch, info_predict, InfoParams, InfoPosterior,
};
pub use moment::{kalman_filter, MomentParams, MomentPosterior};

/// A parameter that is either shared by every timestep or given per step.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeVarying<T> {
    Shared(T),
    PerTimestep(Vec<T>),
}

impl<T> TimeVarying<T> {
    /// Value in effect at timestep `t`.
    pub fn at(&self, t: usize) -> Option<&T> {
        match self {
            TimeVarying::Shared(v) => Some(v),
            TimeVarying::PerTimestep(vs) => vs.get(t),
        }
    }

    /// Number of steps covered (None when shared).
    pub fn num_steps(&self) -> Option<usize> {
        match self {
            TimeVarying::Shared(_) => None,
            TimeVarying::PerTimestep(vs) => Some(vs.len()),
        }
    }

    /// All values, for shape checks.
    pub fn values(&self) -> Vec<&T> {
        match self {
            TimeVarying::Shared(v) => vec![v],
            TimeVarying::PerTimestep(vs) => vs.iter().collect(),
        }
    }

    pub(crate) fn get(&self, name: &str, t: usize) -> Result<&T> {
        self.at(t).ok_or_else(|| {
            InferenceError::DimensionMismatch(format!(
                "{} has {} steps, timestep {} requested",
                name,
                self.num_steps().unwrap_or(0),
                t
            ))
        })
    }

    /// Require coverage of the first `steps` timesteps.
    pub(crate) fn check_covers(&self, name: &str, steps: usize) -> Result<()> {
        match self.num_steps() {
            Some(n) if n < steps => Err(InferenceError::DimensionMismatch(format!(
                "{} has {} steps, need {}",
                name, n, steps
            ))),
            _ => Ok(()),
        }
    }

    /// Apply a fallible conversion to every value, keeping the layout.
    pub fn try_map<U>(&self, mut f: impl FnMut(usize, &T) -> Result<U>) -> Result<TimeVarying<U>> {
        Ok(match self {
            TimeVarying::Shared(v) => TimeVarying::Shared(f(0, v)?),
            TimeVarying::PerTimestep(vs) => TimeVarying::PerTimestep(
                vs.iter()
                    .enumerate()
                    .map(|(t, v)| f(t, v))
                    .collect::<Result<Vec<U>>>()?,
            ),
        })
    }
}

impl<T> From<T> for TimeVarying<T> {
    fn from(value: T) -> Self {
        TimeVarying::Shared(value)
    }
}

/// Row count of the first value, or 0 for an empty series.
pub(crate) fn first_rows(param: &TimeVarying<DMatrix<f64>>) -> usize {
    param.values().first().map(|h| h.nrows()).unwrap_or(0)
}

pub(crate) fn check_matrix_shapes(
    name: &str,
    param: &TimeVarying<DMatrix<f64>>,
    shape: (usize, usize),
) -> Result<()> {
    for m in param.values() {
        if m.shape() != shape {
            return Err(InferenceError::InvalidParameterShape(format!(
                "{} is {:?}, expected {:?}",
                name,
                m.shape(),
                shape
            )));
        }
    }
    Ok(())
}

pub(crate) fn check_vector_shapes(
    name: &str,
    param: &TimeVarying<DVector<f64>>,
    len: usize,
) -> Result<()> {
    for v in param.values() {
        if v.len() != len {
            return Err(InferenceError::InvalidParameterShape(format!(
                "{} has length {}, expected {}",
                name,
                v.len(),
                len
            )));
        }
    }
    Ok(())
}

/// Cholesky factor of a symmetric positive-definite matrix.
pub(crate) fn cholesky(
    m: &DMatrix<f64>,
    timestep: usize,
    context: &'static str,
) -> Result<Cholesky<f64, Dyn>> {
    m.clone()
        .cholesky()
        .ok_or(InferenceError::NonPositiveDefinitePrecision { timestep, context })
}

/// Inverse of a symmetric positive-definite matrix.
pub(crate) fn spd_inverse(
    m: &DMatrix<f64>,
    timestep: usize,
    context: &'static str,
) -> Result<DMatrix<f64>> {
    Ok(cholesky(m, timestep, context)?.inverse())
}

/// Average with the transpose to remove rounding asymmetry.
pub(crate) fn symmetrize(m: DMatrix<f64>) -> DMatrix<f64> {
    (&m + m.transpose()) * 0.5
}

/// Input row `t`, or zeros when the model has no inputs.
pub(crate) fn input_at(inputs: Option<&DMatrix<f64>>, t: usize, input_dim: usize) -> DVector<f64> {
    match inputs {
        Some(u) => u.row(t).transpose(),
        None => DVector::zeros(input_dim),
    }
}

pub(crate) fn check_sequence(
    emissions: &DMatrix<f64>,
    inputs: Option<&DMatrix<f64>>,
    emission_dim: usize,
    input_dim: usize,
) -> Result<usize> {
    let num_timesteps = emissions.nrows();
    if num_timesteps == 0 {
        return Err(InferenceError::DimensionMismatch(
            "sequence has no timesteps".to_string(),
        ));
    }
    if emissions.ncols() != emission_dim {
        return Err(InferenceError::DimensionMismatch(format!(
            "emissions have {} columns, model expects {}",
            emissions.ncols(),
            emission_dim
        )));
    }
    if let Some(u) = inputs {
        if u.shape() != (num_timesteps, input_dim) {
            return Err(InferenceError::DimensionMismatch(format!(
                "inputs are {:?}, expected ({}, {})",
                u.shape(),
                num_timesteps,
                input_dim
            )));
        }
    }
    Ok(num_timesteps)
}
