//! Particle swarm optimization on the axis representation of the space.
//!
//! Each particle moves through the continuous axes (categorical dimensions
//! use their index axis). Velocity update per dimension:
//!
//! `v = w·v + c1·r1·(pbest − x) + c2·r2·(gbest − x)`, clamped to
//! `±v_max_fraction · width`; positions are clamped to the axis bounds.
//! A particle is evaluated at its position mapped back onto legal values
//! (discrete snapped to the lattice, categorical rounded to an index).

use rand::Rng;
use tracing::debug;

use super::genetic::complete;
use super::{OptimizerConfig, Search};

pub(crate) const SWARM_STREAM: &str = "swarm";

#[derive(Debug, Clone)]
struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_fitness: f64,
}

pub(crate) fn run(search: &mut Search<'_>, cfg: &OptimizerConfig) {
    let space = search.space;
    let bounds: Vec<(f64, f64)> = space.specs().iter().map(|s| s.axis_bounds()).collect();
    let v_max: Vec<f64> = bounds.iter().map(|(lo, hi)| (hi - lo) * cfg.v_max_fraction).collect();

    let mut rng = search.hierarchy.rng_for(SWARM_STREAM, 0);
    let mut swarm: Vec<Particle> = (0..cfg.population_size)
        .map(|_| {
            let position: Vec<f64> = bounds
                .iter()
                .map(|&(lo, hi)| if hi > lo { rng.gen_range(lo..=hi) } else { lo })
                .collect();
            let velocity = v_max
                .iter()
                .map(|&vm| if vm > 0.0 { rng.gen_range(-vm..=vm) } else { 0.0 })
                .collect();
            Particle {
                best_position: position.clone(),
                position,
                velocity,
                best_fitness: f64::NEG_INFINITY,
            }
        })
        .collect();

    let mut global: Option<(Vec<f64>, f64)> = None;
    let mut stale = 0;

    for step in 0..cfg.max_iterations.max(1) {
        if step > 0 {
            let mut rng = search.hierarchy.rng_for(SWARM_STREAM, step as u64);
            let Some((g_pos, _)) = global.as_ref() else {
                break;
            };
            for p in &mut swarm {
                for d in 0..bounds.len() {
                    let (r1, r2): (f64, f64) = (rng.gen(), rng.gen());
                    let v = cfg.inertia * p.velocity[d]
                        + cfg.cognitive * r1 * (p.best_position[d] - p.position[d])
                        + cfg.social * r2 * (g_pos[d] - p.position[d]);
                    p.velocity[d] = v.clamp(-v_max[d], v_max[d]);
                    let (lo, hi) = bounds[d];
                    p.position[d] = (p.position[d] + p.velocity[d]).clamp(lo, hi);
                }
            }
        }

        let candidates: Vec<_> = swarm.iter().map(|p| space.from_axes(&p.position)).collect();
        let Some(fitness) = complete(search.evaluate_batch(&candidates, step)) else {
            return;
        };

        let previous_best = global.as_ref().map_or(f64::NEG_INFINITY, |(_, f)| *f);
        for (p, &f) in swarm.iter_mut().zip(&fitness) {
            if f > p.best_fitness {
                p.best_fitness = f;
                p.best_position = p.position.clone();
            }
            // Strictly better only: the earlier particle keeps ties.
            if global.as_ref().map_or(f.is_finite(), |(_, g)| f > *g) {
                global = Some((p.position.clone(), f));
            }
        }

        let current_best = global.as_ref().map_or(f64::NEG_INFINITY, |(_, f)| *f);
        if current_best > previous_best {
            stale = 0;
        } else {
            stale += 1;
            if cfg.patience > 0 && stale >= cfg.patience {
                debug!(step, stale, "particle swarm converged");
                break;
            }
        }
    }
}
