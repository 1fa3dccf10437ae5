//! Exhaustive grid search.

use tracing::debug;

use super::{OptimizeError, OptimizerConfig, Search};

pub(crate) fn run(search: &mut Search<'_>, cfg: &OptimizerConfig) -> Result<(), OptimizeError> {
    let size = match search.space.grid_size(cfg.grid_steps) {
        Some(n) if n <= cfg.max_grid_size => n,
        Some(n) => {
            return Err(OptimizeError::GridTooLarge {
                size: n.to_string(),
                limit: cfg.max_grid_size,
            })
        }
        None => {
            return Err(OptimizeError::GridTooLarge {
                size: "more than usize::MAX".into(),
                limit: cfg.max_grid_size,
            })
        }
    };
    debug!(size, grid_steps = cfg.grid_steps, "grid enumerated");
    search.set_planned(size);

    let grid = search.space.grid(cfg.grid_steps);
    search.evaluate_batch(&grid, 0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::*;
    use stratguard_core::domain::{EvaluationError, ParameterSpec};

    fn grid(config: OptimizerConfig, space: &ParameterSpace, objective: &dyn Objective) -> OptimizationResult {
        Optimizer::new(config)
            .unwrap()
            .optimize(space, objective, &RunControl::new())
            .unwrap()
    }

    #[test]
    fn single_discrete_parameter_picks_maximum() {
        let space = ParameterSpace::new(vec![ParameterSpec::discrete("n", 1.0, 5.0, 1.0)]).unwrap();
        let identity = |p: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            Ok(ObjectiveResult::from_score(p.number("n").unwrap_or(0.0)))
        };
        let r = grid(OptimizerConfig::default(), &space, &identity);
        assert_eq!(r.evaluations, 5);
        assert_eq!(r.best_parameters.unwrap().number("n"), Some(5.0));
        assert_eq!(r.best_score, 5.0);
    }

    #[test]
    fn best_is_max_of_history_and_idempotent() {
        let space = mixed_space();
        let config = OptimizerConfig { grid_steps: 4, ..OptimizerConfig::default() };
        let a = grid(config.clone(), &space, &mixed);
        let b = grid(config, &space, &mixed);
        // 10 periods × 4 thresholds × 3 modes
        assert_eq!(a.evaluations, 120);
        let max = a.history.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(a.best_score, max);
        assert_eq!(a.best_parameters, b.best_parameters);
        assert_eq!(a.best_index, b.best_index);
        assert_eq!(a.best_parameters.as_ref().unwrap().choice("mode"), Some("slow"));
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let space = bowl_space();
        let par = grid(OptimizerConfig { grid_steps: 11, ..OptimizerConfig::default() }, &space, &bowl);
        let seq = grid(
            OptimizerConfig { grid_steps: 11, parallel: false, ..OptimizerConfig::default() },
            &space,
            &bowl,
        );
        assert_eq!(par.history, seq.history);
        let best = par.best_parameters.unwrap();
        assert_eq!(best.number("x"), Some(1.0));
        assert_eq!(best.number("y"), Some(-2.0));
    }

    #[test]
    fn oversized_grid_fails_before_evaluating() {
        let space = ParameterSpace::new(vec![
            ParameterSpec::continuous("a", 0.0, 1.0),
            ParameterSpec::continuous("b", 0.0, 1.0),
        ])
        .unwrap();
        let config = OptimizerConfig { grid_steps: 1_001, max_grid_size: 1_000_000, ..OptimizerConfig::default() };
        let err = Optimizer::new(config)
            .unwrap()
            .optimize(&space, &bowl, &RunControl::new())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::GridTooLarge { .. }));
    }
}
