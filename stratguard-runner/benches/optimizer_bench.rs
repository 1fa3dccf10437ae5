//! Criterion benchmarks for the optimizer hot loops.
//!
//! Run with: `cargo bench -p stratguard-runner`
//!
//! - Grid search over growing grids (parallel vs. sequential)
//! - Genetic search generations
//! - Gaussian-process fit + acquisition over a candidate pool

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stratguard_core::cancel::RunControl;
use stratguard_core::domain::{EvaluationError, ObjectiveResult, ParameterSet, ParameterSpace, ParameterSpec};
use stratguard_runner::optimizer::gp::{expected_improvement, GaussianProcess};
use stratguard_runner::{OptimizationMethod, Optimizer, OptimizerConfig};

// ── Helpers ──────────────────────────────────────────────────────────

fn space() -> ParameterSpace {
    ParameterSpace::new(vec![
        ParameterSpec::continuous("a", -3.0, 3.0),
        ParameterSpec::continuous("b", -3.0, 3.0),
        ParameterSpec::discrete("c", 1.0, 10.0, 1.0),
    ])
    .unwrap()
}

/// A cheap multi-modal objective with a little arithmetic per call.
fn rastrigin(p: &ParameterSet) -> Result<ObjectiveResult, EvaluationError> {
    let a = p.number("a").unwrap_or(0.0);
    let b = p.number("b").unwrap_or(0.0);
    let c = p.number("c").unwrap_or(0.0) / 10.0;
    let term = |x: f64| x * x - 10.0 * (2.0 * std::f64::consts::PI * x).cos();
    Ok(ObjectiveResult::from_score(-(30.0 + term(a) + term(b) + term(c))))
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_search");
    group.sample_size(20);

    for steps in [5usize, 10, 20] {
        for parallel in [true, false] {
            let config = OptimizerConfig {
                method: OptimizationMethod::Grid,
                grid_steps: steps,
                parallel,
                ..OptimizerConfig::default()
            };
            let optimizer = Optimizer::new(config).unwrap();
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, steps), &steps, |b, _| {
                b.iter(|| {
                    let _ = optimizer.optimize(black_box(&space()), &rastrigin, &RunControl::new());
                });
            });
        }
    }

    group.finish();
}

fn bench_genetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("genetic");
    group.sample_size(20);

    for population in [20usize, 50, 100] {
        let optimizer = Optimizer::new(OptimizerConfig {
            method: OptimizationMethod::Genetic,
            population_size: population,
            max_iterations: 20,
            patience: 0,
            ..OptimizerConfig::default()
        })
        .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(population), &population, |b, _| {
            b.iter(|| {
                let _ = optimizer.optimize(black_box(&space()), &rastrigin, &RunControl::new());
            });
        });
    }

    group.finish();
}

fn bench_gp_acquisition(c: &mut Criterion) {
    let mut group = c.benchmark_group("gp_acquisition");

    for n in [10usize, 50, 100] {
        let xs: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i as f64 * 0.37) % 1.0, (i as f64 * 0.61) % 1.0])
            .collect();
        let ys: Vec<f64> = xs.iter().map(|x| -(x[0] - 0.3).powi(2) - (x[1] - 0.7).powi(2)).collect();
        let best = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let gp = GaussianProcess::fit(black_box(&xs), &ys, 0.2, 1e-6).unwrap();
                (0..1_000)
                    .map(|i| {
                        let x = [(i as f64 * 0.013) % 1.0, (i as f64 * 0.029) % 1.0];
                        let (mu, sigma) = gp.predict(&x);
                        expected_improvement(mu, sigma, best, 0.01)
                    })
                    .fold(f64::NEG_INFINITY, f64::max)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grid_search, bench_genetic, bench_gp_acquisition);
criterion_main!(benches);
