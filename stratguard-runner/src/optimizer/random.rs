//! Uniform random search.
//!
//! All samples are drawn up front from one seeded stream, so the candidate
//! list (and therefore the history) does not depend on evaluation order.

use super::{OptimizerConfig, Search};

pub(crate) const RANDOM_STREAM: &str = "random";

pub(crate) fn run(search: &mut Search<'_>, cfg: &OptimizerConfig) {
    let mut rng = search.hierarchy.rng_for(RANDOM_STREAM, 0);
    let candidates: Vec<_> = (0..cfg.max_iterations)
        .map(|_| search.space.sample(&mut rng))
        .collect();
    search.set_planned(candidates.len());
    search.evaluate_batch(&candidates, 0);
}
