//! Genetic algorithm.
//!
//! Generation 0 is a uniform random population. Each later generation keeps
//! the single best individual unchanged and fills the rest with children:
//! two tournament-selected parents, uniform crossover with probability
//! `crossover_rate`, then per-gene mutation with probability `mutation_rate`.
//! Children of one generation are evaluated as a batch (in parallel when
//! enabled); breeding itself is sequential and seeded per generation.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

use stratguard_core::domain::{ParamValue, ParameterKind, ParameterSet, ParameterSpace};

use super::{OptimizerConfig, Search};

pub(crate) const GENETIC_STREAM: &str = "genetic";

pub(crate) fn run(search: &mut Search<'_>, cfg: &OptimizerConfig) {
    let space = search.space;
    let pop_size = cfg.population_size;

    let mut rng = search.hierarchy.rng_for(GENETIC_STREAM, 0);
    let mut population: Vec<ParameterSet> = (0..pop_size).map(|_| space.sample(&mut rng)).collect();
    let Some(mut fitness) = complete(search.evaluate_batch(&population, 0)) else {
        return;
    };

    let mut best = max_fitness(&fitness);
    let mut stale = 0;

    for generation in 1..cfg.max_iterations.max(1) {
        let mut rng = search.hierarchy.rng_for(GENETIC_STREAM, generation as u64);
        let elite = ranked(&fitness)[0];

        let mut children = Vec::with_capacity(pop_size - 1);
        while children.len() < pop_size - 1 {
            let a = tournament(&fitness, cfg.tournament_size, &mut rng);
            let b = tournament(&fitness, cfg.tournament_size, &mut rng);
            let child = if rng.gen_bool(cfg.crossover_rate) {
                crossover(space, &population[a], &population[b], &mut rng)
            } else {
                population[a].clone()
            };
            children.push(mutate(space, &child, cfg, &mut rng));
        }

        let Some(child_fitness) = complete(search.evaluate_batch(&children, generation)) else {
            return;
        };

        let elite_set = population[elite].clone();
        let elite_fitness = fitness[elite];
        population = std::iter::once(elite_set).chain(children).collect();
        fitness = std::iter::once(elite_fitness).chain(child_fitness).collect();

        let generation_best = max_fitness(&fitness);
        if generation_best > best {
            best = generation_best;
            stale = 0;
        } else {
            stale += 1;
            if cfg.patience > 0 && stale >= cfg.patience {
                debug!(generation, stale, "genetic search converged");
                break;
            }
        }
    }
}

/// All fitness values, or `None` if the batch was cut short.
pub(crate) fn complete(batch: Vec<Option<f64>>) -> Option<Vec<f64>> {
    batch.into_iter().collect()
}

pub(crate) fn max_fitness(fitness: &[f64]) -> f64 {
    fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Indices sorted by fitness, best first; ties keep the lower index first.
fn ranked(fitness: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fitness.len()).collect();
    order.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]).then(a.cmp(&b)));
    order
}

/// Best of `size` uniformly drawn contestants (with replacement).
fn tournament(fitness: &[f64], size: usize, rng: &mut StdRng) -> usize {
    let mut winner = rng.gen_range(0..fitness.len());
    for _ in 1..size {
        let c = rng.gen_range(0..fitness.len());
        if fitness[c] > fitness[winner] || (fitness[c] == fitness[winner] && c < winner) {
            winner = c;
        }
    }
    winner
}

/// Uniform crossover: each gene from either parent with equal probability.
fn crossover(space: &ParameterSpace, a: &ParameterSet, b: &ParameterSet, rng: &mut StdRng) -> ParameterSet {
    let values = space
        .specs()
        .iter()
        .filter_map(|spec| {
            let parent = if rng.gen_bool(0.5) { a } else { b };
            parent.get(&spec.name).map(|v| (spec.name.clone(), v.clone()))
        })
        .collect();
    ParameterSet::from_values(values)
}

/// Per-gene mutation: Gaussian for numeric genes (snapped back onto the
/// lattice for discrete specs), uniform resample for categorical genes.
fn mutate(space: &ParameterSpace, set: &ParameterSet, cfg: &OptimizerConfig, rng: &mut StdRng) -> ParameterSet {
    let mut out = set.clone();
    for spec in space.specs() {
        if !rng.gen_bool(cfg.mutation_rate) {
            continue;
        }
        let value = match spec.kind {
            ParameterKind::Categorical => spec.sample(rng),
            ParameterKind::Continuous | ParameterKind::Discrete => {
                let current = out.number(&spec.name).unwrap_or(spec.min);
                let z: f64 = rng.sample(StandardNormal);
                ParamValue::Number(spec.snap(current + z * cfg.mutation_scale * (spec.max - spec.min)))
            }
        };
        out = out.with_value(&spec.name, value);
    }
    out
}
