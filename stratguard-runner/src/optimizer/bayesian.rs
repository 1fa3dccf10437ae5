//! Bayesian optimization: Gaussian-process surrogate + expected improvement.
//!
//! The first `initial_samples` evaluations are uniform random (one batch).
//! After that, each step fits the GP on every successful evaluation so far,
//! scores `candidate_pool` random candidates by expected improvement and
//! evaluates the best one. `max_iterations` counts all evaluations.

use tracing::{debug, warn};

use super::gp::{expected_improvement, GaussianProcess};
use super::{OptimizerConfig, Search};

pub(crate) const BAYESIAN_INIT_STREAM: &str = "bayesian_init";
pub(crate) const BAYESIAN_STREAM: &str = "bayesian";

pub(crate) fn run(search: &mut Search<'_>, cfg: &OptimizerConfig) {
    let space = search.space;
    let total = cfg.max_iterations;
    let n_init = cfg.initial_samples.clamp(1, total);
    search.set_planned(total);

    let mut rng = search.hierarchy.rng_for(BAYESIAN_INIT_STREAM, 0);
    let initial: Vec<_> = (0..n_init).map(|_| space.sample(&mut rng)).collect();
    if search.evaluate_batch(&initial, 0).iter().any(Option::is_none) {
        return;
    }

    for iteration in n_init..total {
        let mut rng = search.hierarchy.rng_for(BAYESIAN_STREAM, iteration as u64);

        let (xs, ys): (Vec<Vec<f64>>, Vec<f64>) = search
            .history()
            .iter()
            .filter(|r| r.is_success())
            .map(|r| (space.to_unit(&r.parameters), r.fitness))
            .unzip();
        let best = search.best_fitness();

        let next = match (GaussianProcess::fit(&xs, &ys, cfg.length_scale, cfg.noise), best) {
            (Some(gp), Some(best)) => {
                let mut chosen = None;
                let mut chosen_ei = f64::NEG_INFINITY;
                for _ in 0..cfg.candidate_pool {
                    let candidate = space.sample(&mut rng);
                    let (mu, sigma) = gp.predict(&space.to_unit(&candidate));
                    let ei = expected_improvement(mu, sigma, best, cfg.xi);
                    // First candidate keeps ties.
                    if ei > chosen_ei {
                        chosen_ei = ei;
                        chosen = Some(candidate);
                    }
                }
                match chosen {
                    Some(c) => c,
                    None => space.sample(&mut rng),
                }
            }
            _ => {
                warn!(iteration, observations = xs.len(), "surrogate unavailable, sampling at random");
                space.sample(&mut rng)
            }
        };

        if search.evaluate(&next, iteration).is_none() {
            return;
        }
    }
    debug!(evaluations = search.evaluations(), "bayesian search finished");
}
