//! Property tests for runner invariants.
//!
//! Uses proptest to verify:
//! 1. Overfitting score bounds — always in `[0, 1]`, even for non-finite
//!    scores; a pass implies degradation below the threshold
//! 2. Optimizer history — every evaluated set is legal and the best score
//!    is the maximum of the history with the earliest index
//! 3. Degradation severity is monotone in the degradation

use proptest::prelude::*;
use stratguard_core::cancel::RunControl;
use stratguard_core::domain::{EvaluationError, ObjectiveResult, ParameterSet, ParameterSpace, ParameterSpec};
use stratguard_runner::overfitting::degradation::degradation_severity;
use stratguard_runner::{
    DetectionInput, OptimizationMethod, Optimizer, OptimizerConfig, OverfittingConfig, OverfittingDetector,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_score() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => -5.0..5.0_f64,
        1 => Just(f64::NEG_INFINITY),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NAN),
    ]
}

fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.1..0.1_f64, 0..max_len)
}

fn arb_method() -> impl Strategy<Value = OptimizationMethod> {
    prop::sample::select(OptimizationMethod::ALL.to_vec())
}

fn space() -> ParameterSpace {
    ParameterSpace::new(vec![
        ParameterSpec::discrete("n", 1.0, 9.0, 2.0),
        ParameterSpec::continuous("x", -1.0, 1.0),
        ParameterSpec::categorical("side", ["long", "short"]),
    ])
    .unwrap()
}

// ── 1. Overfitting Score Bounds ──────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn overfitting_score_is_bounded(
        train in arb_score(),
        validation in arb_score(),
        test in arb_score(),
        slope in -3.0..3.0_f64,
        oos in arb_series(40),
        returns in arb_series(60),
        x in -1.0..1.0_f64,
    ) {
        let space = space();
        let params = space.from_axes(&[5.0, x, 0.0]);
        let perturb = move |p: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            Ok(ObjectiveResult::from_score(test + slope * p.number("x").unwrap_or(0.0)))
        };
        let input = DetectionInput {
            train_score: train,
            validation_score: validation,
            test_score: test,
            parameters: &params,
            space: &space,
            oos_scores: &oos,
            strategy_returns: &returns,
            benchmark_returns: None,
        };
        let cfg = OverfittingConfig::default();
        let report = OverfittingDetector::new(cfg.clone()).unwrap().detect(&input, &perturb);

        prop_assert!((0.0..=1.0).contains(&report.overfitting_score));
        prop_assert!(report.sensitivity_score.is_finite());
        if !test.is_finite() {
            prop_assert_eq!(report.sensitivity_score, 1.0);
            prop_assert!(!report.passed);
        }
        for t in [report.tests.degradation, report.tests.sensitivity, report.tests.white_noise, report.tests.significance] {
            prop_assert!((0.0..=1.0).contains(&t.risk));
        }
        if report.passed {
            prop_assert!(report.degradation_pct < cfg.max_degradation);
            prop_assert!(report.overfitting_score < cfg.max_overfitting_score);
        }
        prop_assert!((0.0..=1.0).contains(&report.white_noise_p_value));
    }
}

// ── 2. Optimizer History ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn best_is_earliest_maximum_of_legal_history(
        method in arb_method(),
        seed in any::<u64>(),
        a in -2.0..2.0_f64,
        b in -2.0..2.0_f64,
    ) {
        let objective = move |p: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            let n = p.number("n").unwrap_or(0.0);
            let x = p.number("x").unwrap_or(0.0);
            let side = if p.choice("side") == Some("long") { 1.0 } else { -1.0 };
            // Coarse rounding creates ties on purpose.
            Ok(ObjectiveResult::from_score(((a * x + b * side - n / 10.0) * 4.0).round()))
        };
        let config = OptimizerConfig {
            method,
            seed,
            max_iterations: 10,
            population_size: 6,
            initial_samples: 4,
            candidate_pool: 50,
            grid_steps: 3,
            ..OptimizerConfig::default()
        };
        let space = space();
        let r = Optimizer::new(config).unwrap().optimize(&space, &objective, &RunControl::new()).unwrap();

        for h in &r.history {
            prop_assert!(space.check(&h.parameters).is_ok());
        }
        let max = r.history.iter().map(|h| h.fitness).fold(f64::NEG_INFINITY, f64::max);
        prop_assert_eq!(r.best_score, max);
        let earliest = r.history.iter().find(|h| h.fitness == max).map(|h| h.index);
        prop_assert_eq!(r.best_index, earliest);
        prop_assert_eq!(r.evaluations, r.history.len());
    }
}

// ── 3. Severity Monotonicity ─────────────────────────────────────────

proptest! {
    #[test]
    fn severity_never_decreases_with_degradation(a in -1.0..2.0_f64, b in -1.0..2.0_f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(degradation_severity(lo) <= degradation_severity(hi));
    }
}
