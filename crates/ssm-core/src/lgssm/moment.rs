//! Covariance-form Kalman filter.
//!
//! Used as the reference for the information filter and as the source of
//! the marginal log-likelihood, which the information recursion does not
//! track.

use nalgebra::{DMatrix, DVector};

use super::{
    check_matrix_shapes, check_sequence, check_vector_shapes, cholesky, first_rows, input_at,
    symmetrize,
    TimeVarying,
};
use crate::error::{InferenceError, Result};

const LOG_2PI: f64 = 1.837_877_066_409_345_3;

/// LGSSM parameters with covariances.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentParams {
    pub initial_mean: DVector<f64>,
    pub initial_covariance: DMatrix<f64>,
    pub dynamics_matrix: TimeVarying<DMatrix<f64>>,
    pub dynamics_covariance: TimeVarying<DMatrix<f64>>,
    pub dynamics_input_weights: TimeVarying<DMatrix<f64>>,
    pub dynamics_bias: TimeVarying<DVector<f64>>,
    pub emission_matrix: TimeVarying<DMatrix<f64>>,
    pub emission_input_weights: TimeVarying<DMatrix<f64>>,
    pub emission_bias: TimeVarying<DVector<f64>>,
    pub emission_covariance: TimeVarying<DMatrix<f64>>,
}

impl MomentParams {
    /// Model without inputs and with zero biases.
    pub fn new(
        initial_mean: DVector<f64>,
        initial_covariance: DMatrix<f64>,
        dynamics_matrix: impl Into<TimeVarying<DMatrix<f64>>>,
        dynamics_covariance: impl Into<TimeVarying<DMatrix<f64>>>,
        emission_matrix: impl Into<TimeVarying<DMatrix<f64>>>,
        emission_covariance: impl Into<TimeVarying<DMatrix<f64>>>,
    ) -> Self {
        let state_dim = initial_mean.len();
        let emission_matrix = emission_matrix.into();
        let emission_dim = first_rows(&emission_matrix);
        Self {
            initial_mean,
            initial_covariance,
            dynamics_matrix: dynamics_matrix.into(),
            dynamics_covariance: dynamics_covariance.into(),
            dynamics_input_weights: TimeVarying::Shared(DMatrix::zeros(state_dim, 0)),
            dynamics_bias: TimeVarying::Shared(DVector::zeros(state_dim)),
            emission_matrix,
            emission_input_weights: TimeVarying::Shared(DMatrix::zeros(emission_dim, 0)),
            emission_bias: TimeVarying::Shared(DVector::zeros(emission_dim)),
            emission_covariance: emission_covariance.into(),
        }
    }

    pub fn with_inputs(
        mut self,
        dynamics_input_weights: impl Into<TimeVarying<DMatrix<f64>>>,
        emission_input_weights: impl Into<TimeVarying<DMatrix<f64>>>,
    ) -> Self {
        self.dynamics_input_weights = dynamics_input_weights.into();
        self.emission_input_weights = emission_input_weights.into();
        self
    }

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

    fn validate(&self, num_timesteps: usize) -> Result<()> {
        let (n, m, p) = (self.state_dim(), self.emission_dim(), self.input_dim());
        if self.initial_covariance.shape() != (n, n) {
            return Err(InferenceError::InvalidParameterShape(format!(
                "initial_covariance is {:?}, expected ({}, {})",
                self.initial_covariance.shape(),
                n,
                n
            )));
        }
        check_matrix_shapes("dynamics_matrix", &self.dynamics_matrix, (n, n))?;
        check_matrix_shapes("dynamics_covariance", &self.dynamics_covariance, (n, n))?;
        check_matrix_shapes("dynamics_input_weights", &self.dynamics_input_weights, (n, p))?;
        check_vector_shapes("dynamics_bias", &self.dynamics_bias, n)?;
        check_matrix_shapes("emission_matrix", &self.emission_matrix, (m, n))?;
        check_matrix_shapes("emission_input_weights", &self.emission_input_weights, (m, p))?;
        check_vector_shapes("emission_bias", &self.emission_bias, m)?;
        check_matrix_shapes("emission_covariance", &self.emission_covariance, (m, m))?;

        let transitions = num_timesteps.saturating_sub(1);
        self.dynamics_matrix.check_covers("dynamics_matrix", transitions)?;
        self.dynamics_covariance
            .check_covers("dynamics_covariance", transitions)?;
        self.dynamics_input_weights
            .check_covers("dynamics_input_weights", transitions)?;
        self.dynamics_bias.check_covers("dynamics_bias", transitions)?;
        self.emission_matrix.check_covers("emission_matrix", num_timesteps)?;
        self.emission_input_weights
            .check_covers("emission_input_weights", num_timesteps)?;
        self.emission_bias.check_covers("emission_bias", num_timesteps)?;
        self.emission_covariance
            .check_covers("emission_covariance", num_timesteps)?;
        Ok(())
    }
}

/// Filtered moments plus the marginal log-likelihood.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentPosterior {
    pub marginal_loglik: f64,
    pub filtered_means: Vec<DVector<f64>>,
    pub filtered_covariances: Vec<DMatrix<f64>>,
}

/// Run the covariance-form Kalman filter over a T×m emission matrix.
pub fn kalman_filter(
    params: &MomentParams,
    emissions: &DMatrix<f64>,
    inputs: Option<&DMatrix<f64>>,
) -> Result<MomentPosterior> {
    let input_dim = params.input_dim();
    let num_timesteps = check_sequence(emissions, inputs, params.emission_dim(), input_dim)?;
    params.validate(num_timesteps)?;

    let n = params.state_dim();
    let m = params.emission_dim();
    let mut mean = params.initial_mean.clone();
    let mut cov = params.initial_covariance.clone();
    let mut marginal_loglik = 0.0;
    let mut filtered_means = Vec::with_capacity(num_timesteps);
    let mut filtered_covariances = Vec::with_capacity(num_timesteps);

    for t in 0..num_timesteps {
        let u = input_at(inputs, t, input_dim);
        let y = emissions.row(t).transpose();
        let h = params.emission_matrix.get("emission_matrix", t)?;
        let r = params.emission_covariance.get("emission_covariance", t)?;
        let d_u = params.emission_input_weights.get("emission_input_weights", t)? * &u;
        let d = params.emission_bias.get("emission_bias", t)?;

        // Condition
        let residual = y - h * &mean - d_u - d;
        let s = symmetrize(h * &cov * h.transpose() + r);
        let chol = cholesky(&s, t, "innovation covariance")?;
        let gain = chol.solve(&(h * &cov)).transpose();
        let s_inv_r = chol.solve(&residual);
        let log_det: f64 = chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>() * 2.0;
        marginal_loglik += -0.5 * (m as f64 * LOG_2PI + log_det + residual.dot(&s_inv_r));

        mean += &gain * &residual;
        let i_kh = DMatrix::identity(n, n) - &gain * h;
        cov = symmetrize(&i_kh * &cov * i_kh.transpose() + &gain * r * gain.transpose());

        filtered_means.push(mean.clone());
        filtered_covariances.push(cov.clone());

        // Predict
        if t + 1 < num_timesteps {
            let f = params.dynamics_matrix.get("dynamics_matrix", t)?;
            let q = params.dynamics_covariance.get("dynamics_covariance", t)?;
            let b_u = params.dynamics_input_weights.get("dynamics_input_weights", t)? * &u;
            let b = params.dynamics_bias.get("dynamics_bias", t)?;
            mean = f * &mean + b_u + b;
            cov = symmetrize(f * &cov * f.transpose() + q);
        }
    }

    Ok(MomentPosterior {
        marginal_loglik,
        filtered_means,
        filtered_covariances,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn scalar(v: f64) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, v)
    }

    #[test]
    fn single_step_is_conjugate_update() {
        // Prior N(0, 1), observation 2 with noise variance 1 => N(1, 1/2).
        let params = MomentParams::new(
            DVector::zeros(1),
            scalar(1.0),
            scalar(1.0),
            scalar(1.0),
            scalar(1.0),
            scalar(1.0),
        );
        let post = kalman_filter(&params, &scalar(2.0), None).unwrap();
        assert!(approx_eq(post.filtered_means[0][0], 1.0, 1e-12));
        assert!(approx_eq(post.filtered_covariances[0][(0, 0)], 0.5, 1e-12));
        // y ~ N(0, 2)
        let expected = -0.5 * (LOG_2PI + 2.0f64.ln() + 4.0 / 2.0);
        assert!(approx_eq(post.marginal_loglik, expected, 1e-12));
    }

    #[test]
    fn inputs_shift_the_state() {
        let params = MomentParams::new(
            DVector::zeros(1),
            scalar(1e-9),
            scalar(1.0),
            scalar(1e-9),
            scalar(1.0),
            scalar(1e6),
        )
        .with_inputs(scalar(1.0), DMatrix::zeros(1, 1));
        let emissions = DMatrix::zeros(3, 1);
        let inputs = DMatrix::from_column_slice(3, 1, &[1.0, 2.0, 0.0]);
        let post = kalman_filter(&params, &emissions, Some(&inputs)).unwrap();
        // Observations are nearly uninformative, so the state follows the inputs.
        assert!(approx_eq(post.filtered_means[1][0], 1.0, 1e-3));
        assert!(approx_eq(post.filtered_means[2][0], 3.0, 1e-3));
    }

    #[test]
    fn singular_innovation_covariance_rejected() {
        let params = MomentParams::new(
            DVector::zeros(1),
            scalar(0.0),
            scalar(1.0),
            scalar(0.0),
            scalar(1.0),
            scalar(0.0),
        );
        assert!(matches!(
            kalman_filter(&params, &scalar(1.0), None),
            Err(InferenceError::NonPositiveDefinitePrecision { timestep: 0, .. })
        ));
    }
}
