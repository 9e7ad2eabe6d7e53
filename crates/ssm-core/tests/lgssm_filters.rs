//! Information-form and covariance-form filters must agree.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use ssm_core::error::InferenceError;
use ssm_core::lgssm::{
    info_filter, info_filter_batch, kalman_filter, InfoParams, MomentParams, TimeVarying,
};

const NUM_TIMESTEPS: usize = 50;

/// Damped rotation observed through its first coordinate.
fn tracking_model() -> MomentParams {
    let theta: f64 = 0.1;
    let f = DMatrix::from_row_slice(
        2,
        2,
        &[
            0.95 * theta.cos(),
            -0.95 * theta.sin(),
            0.95 * theta.sin(),
            0.95 * theta.cos(),
        ],
    );
    MomentParams::new(
        DVector::from_vec(vec![1.0, -1.0]),
        DMatrix::identity(2, 2) * 2.0,
        f,
        DMatrix::identity(2, 2) * 0.1,
        DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        DMatrix::from_element(1, 1, 0.5),
    )
}

fn noisy_observations(seed: u64) -> DMatrix<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.7).unwrap();
    DMatrix::from_fn(NUM_TIMESTEPS, 1, |t, _| {
        (t as f64 * 0.2).sin() + noise.sample(&mut rng)
    })
}

fn assert_close(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < tol, "{} vs {}", x, y);
    }
}

#[test]
fn info_and_moment_means_agree_every_step() {
    let moment = tracking_model();
    let info = InfoParams::from_moment(&moment).unwrap();
    let emissions = noisy_observations(1);

    let reference = kalman_filter(&moment, &emissions, None).unwrap();
    let posterior = info_filter(&info, &emissions, None).unwrap();
    let means = posterior.filtered_means().unwrap();
    let covariances = posterior.filtered_covariances().unwrap();

    assert_eq!(means.len(), NUM_TIMESTEPS);
    assert!(reference.marginal_loglik.is_finite());
    for t in 0..NUM_TIMESTEPS {
        for i in 0..2 {
            assert!(
                (means[t][i] - reference.filtered_means[t][i]).abs() < 1e-8,
                "t={} i={}: {} vs {}",
                t,
                i,
                means[t][i],
                reference.filtered_means[t][i]
            );
        }
        assert_close(&covariances[t], &reference.filtered_covariances[t], 1e-8);
    }
}

#[test]
fn per_timestep_parameters_and_inputs_agree() {
    let base = tracking_model();
    let dynamics: Vec<DMatrix<f64>> = (0..NUM_TIMESTEPS - 1)
        .map(|t| DMatrix::identity(2, 2) * (0.9 + 0.001 * t as f64))
        .collect();
    let emission_cov: Vec<DMatrix<f64>> = (0..NUM_TIMESTEPS)
        .map(|t| DMatrix::from_element(1, 1, 0.3 + 0.01 * t as f64))
        .collect();
    let moment = MomentParams {
        dynamics_matrix: TimeVarying::PerTimestep(dynamics),
        emission_covariance: TimeVarying::PerTimestep(emission_cov),
        ..base
    }
    .with_inputs(
        DMatrix::from_row_slice(2, 1, &[0.5, -0.2]),
        DMatrix::from_element(1, 1, 0.1),
    )
    .with_biases(
        DVector::from_vec(vec![0.01, 0.0]),
        DVector::from_element(1, -0.05),
    );
    let info = InfoParams::from_moment(&moment).unwrap();
    let emissions = noisy_observations(2);
    let inputs = DMatrix::from_fn(NUM_TIMESTEPS, 1, |t, _| if t % 10 < 5 { 1.0 } else { -1.0 });

    let reference = kalman_filter(&moment, &emissions, Some(&inputs)).unwrap();
    let means = info_filter(&info, &emissions, Some(&inputs))
        .unwrap()
        .filtered_means()
        .unwrap();
    for t in 0..NUM_TIMESTEPS {
        assert!((&means[t] - &reference.filtered_means[t]).amax() < 1e-8);
    }
}

#[test]
fn short_per_timestep_series_is_rejected() {
    let moment = MomentParams {
        emission_covariance: TimeVarying::PerTimestep(vec![DMatrix::from_element(1, 1, 0.5); 10]),
        ..tracking_model()
    };
    let emissions = noisy_observations(3);
    assert!(matches!(
        kalman_filter(&moment, &emissions, None),
        Err(InferenceError::DimensionMismatch(_))
    ));
    let info = InfoParams::from_moment(&moment).unwrap();
    assert!(matches!(
        info_filter(&info, &emissions, None),
        Err(InferenceError::DimensionMismatch(_))
    ));
}

#[test]
fn batch_filter_matches_single_runs() {
    let info = InfoParams::from_moment(&tracking_model()).unwrap();
    let batch: Vec<DMatrix<f64>> = (0..4).map(noisy_observations).collect();
    let together = info_filter_batch(&info, &batch, None).unwrap();
    for (emissions, posterior) in batch.iter().zip(&together) {
        assert_eq!(&info_filter(&info, emissions, None).unwrap(), posterior);
    }
}
