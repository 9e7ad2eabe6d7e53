//! Criterion benchmarks for forward-backward, EM and the information filter.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ssm_config::{EmConfig, FitConfig};
use ssm_core::hmm::{fit_em, Hmm, PoissonEmissions};
use ssm_core::lgssm::{info_filter, InfoParams};

fn poisson_model(k: usize) -> Hmm<PoissonEmissions> {
    let stay = 0.9;
    let leave = (1.0 - stay) / (k as f64 - 1.0);
    Hmm::new(
        DVector::from_element(k, 1.0 / k as f64),
        DMatrix::from_fn(k, k, |i, j| if i == j { stay } else { leave }),
        PoissonEmissions::new(DMatrix::from_fn(k, 2, |i, d| 1.0 + 3.0 * i as f64 + d as f64))
            .expect("valid rates"),
    )
    .expect("valid model")
}

fn bench_smoother(c: &mut Criterion) {
    let mut group = c.benchmark_group("hmm_smoother");
    for &k in &[2usize, 5, 10] {
        let model = poisson_model(k);
        let mut rng = StdRng::seed_from_u64(1);
        let (_, emissions) = model.sample(&mut rng, 1_000);
        group.bench_with_input(BenchmarkId::new("T=1000", k), &emissions, |b, y| {
            b.iter(|| {
                let post = model.smoother(black_box(y)).expect("smoother should run");
                black_box(post.marginal_loglik);
            })
        });
    }
    group.finish();
}

fn bench_em(c: &mut Criterion) {
    let truth = poisson_model(3);
    let mut rng = StdRng::seed_from_u64(2);
    let batch: Vec<DMatrix<f64>> = (0..16).map(|_| truth.sample(&mut rng, 500).1).collect();

    let mut group = c.benchmark_group("fit_em");
    for parallel in [false, true] {
        let config = FitConfig {
            em: EmConfig::default()
                .with_num_iterations(10)
                .with_convergence_tolerance(0.0)
                .with_parallel(parallel),
            ..FitConfig::default()
        };
        group.bench_with_input(
            BenchmarkId::new("16x500_10iters", if parallel { "parallel" } else { "sequential" }),
            &config,
            |b, cfg| {
                b.iter(|| {
                    let fit = fit_em(truth.clone(), black_box(&batch), cfg).expect("fit should run");
                    black_box(fit.iterations);
                })
            },
        );
    }
    group.finish();
}

fn bench_info_filter(c: &mut Criterion) {
    let n = 4;
    let params = InfoParams::new(
        DVector::zeros(n),
        DMatrix::identity(n, n),
        DMatrix::identity(n, n) * 0.99,
        DMatrix::identity(n, n) * 10.0,
        DMatrix::from_fn(2, n, |i, j| if i == j { 1.0 } else { 0.0 }),
        DMatrix::identity(2, 2),
    );
    let emissions = DMatrix::from_fn(1_000, 2, |t, d| ((t + d) as f64 * 0.01).sin());
    c.bench_function("info_filter_T1000_n4", |b| {
        b.iter(|| {
            let post = info_filter(&params, black_box(&emissions), None).expect("filter should run");
            black_box(post.filtered_etas.len());
        })
    });
}

criterion_group!(benches, bench_smoother, bench_em, bench_info_filter);
criterion_main!(benches);
