//! Property tests for core invariants.
//!
//! Uses proptest to verify:
//! 1. No leakage — every split keeps `train.end + purge_gap <= test.start`
//! 2. Sizing bounds — size is never negative, risk never exceeds `max_risk`
//! 3. Volatility monotonicity — higher volatility never increases the size
//! 4. Tail ordering — `cvar95 <= var95 <= 0` for scenarios and Monte Carlo

use std::collections::BTreeMap;

use proptest::prelude::*;
use stratguard_core::cancel::RunControl;
use stratguard_core::domain::{PortfolioSnapshot, Position};
use stratguard_core::sizing::{MarketData, PositionSizer, SizingConfig, SizingRequest};
use stratguard_core::split::{SplitMode, TimeSeriesSplitter};
use stratguard_core::stress::{MonteCarloConfig, StressConfig, StressScenario, StressTestEngine};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_returns(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-0.05..0.05_f64, len)
}

fn request(entry: f64, stop: f64, vol: Option<f64>, confidence: f64) -> SizingRequest {
    SizingRequest {
        symbol: "AAPL".into(),
        entry_price: entry,
        stop_loss: stop,
        market_data: MarketData {
            volatility: vol,
            ..MarketData::default()
        },
        confidence,
        kelly: None,
    }
}

// ── 1. No Leakage ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn walk_forward_splits_never_leak(
        len in 50usize..2_000,
        train in 10usize..300,
        val in 0usize..50,
        test in 5usize..100,
        step in 1usize..100,
        gap in 0usize..10,
    ) {
        let mode = SplitMode::WalkForward {
            train_window: train,
            validation_window: val,
            test_window: test,
            step_size: step,
            purge_gap: gap,
        };
        if let Ok(splits) = TimeSeriesSplitter::split(len, &mode) {
            prop_assert!(!splits.is_empty());
            for s in &splits {
                prop_assert!(s.is_leak_free(gap, len));
                prop_assert!(s.train.end + gap <= s.test.start);
                prop_assert!(s.test.end <= len);
            }
        }
    }

    #[test]
    fn k_fold_splits_never_leak(
        len in 20usize..2_000,
        k in 2usize..10,
        gap in 0usize..10,
        vf in 0.0..0.3_f64,
    ) {
        let mode = SplitMode::KFold { k, purge_gap: gap, validation_fraction: vf };
        if let Ok(splits) = TimeSeriesSplitter::split(len, &mode) {
            prop_assert_eq!(splits.len(), k);
            for s in &splits {
                prop_assert!(s.is_leak_free(gap, len));
                prop_assert!(!s.test.is_empty());
            }
        }
    }

    #[test]
    fn expanding_splits_never_leak(
        len in 50usize..2_000,
        n in 1usize..8,
        min_train in 10usize..200,
        min_test in 1usize..50,
        gap in 0usize..10,
    ) {
        let mode = SplitMode::Expanding { n_folds: n, min_train, min_test, purge_gap: gap };
        if let Ok(splits) = TimeSeriesSplitter::split(len, &mode) {
            for s in &splits {
                prop_assert_eq!(s.train.start, 0);
                prop_assert!(s.is_leak_free(gap, len));
            }
        }
    }
}

// ── 2. Sizing Bounds ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn sizing_is_bounded(
        total in 1_000.0..10_000_000.0_f64,
        entry in arb_price(),
        stop_frac in 0.01..0.5_f64,
        vol in 0.0..0.2_f64,
        confidence in 0.0..=100.0_f64,
    ) {
        let sizer = PositionSizer::new(SizingConfig::default()).unwrap();
        let portfolio = PortfolioSnapshot::from_positions(total, []);
        let req = request(entry, entry * (1.0 - stop_frac), Some(vol), confidence);
        let r = sizer.size(&req, &portfolio).unwrap();
        prop_assert!(r.recommended_size >= 0.0);
        prop_assert!(r.risk_amount <= sizer.config().max_risk + 1e-9);
        prop_assert!(r.recommended_size <= sizer.config().max_position_size + 1e-9);
        prop_assert!(r.recommended_size * entry <= sizer.config().max_position_percent * total + 1e-6);
    }

    // ── 3. Volatility Monotonicity ──

    #[test]
    fn higher_volatility_never_increases_size(
        entry in arb_price(),
        v1 in 0.0..0.2_f64,
        dv in 0.001..0.2_f64,
    ) {
        let config = SizingConfig {
            max_position_size: 1e12,
            max_position_percent: 1.0,
            ..SizingConfig::default()
        };
        let sizer = PositionSizer::new(config).unwrap();
        let portfolio = PortfolioSnapshot::from_positions(1e9, []);
        let stop = entry * 0.95;
        let low = sizer.size(&request(entry, stop, Some(v1), 100.0), &portfolio).unwrap();
        let high = sizer.size(&request(entry, stop, Some(v1 + dv), 100.0), &portfolio).unwrap();
        prop_assert!(high.recommended_size < low.recommended_size);
    }
}

// ── 4. Tail Ordering ─────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn scenario_cvar_at_least_as_severe_as_var(
        returns in arb_returns(40),
        shock in -0.5..0.0_f64,
        mult in 0.5..10.0_f64,
        cash in 0.0..50_000.0_f64,
    ) {
        let portfolio = PortfolioSnapshot::from_positions(
            cash,
            [Position::new("AAPL", 100.0, 150.0, 150.0)],
        );
        let engine = StressTestEngine::new(
            StressConfig::default(),
            BTreeMap::from([("AAPL".to_string(), returns)]),
        );
        let r = engine.run_scenario(&StressScenario::new("x", shock, mult), &portfolio);
        prop_assert!(r.var95 <= 0.0);
        prop_assert!(r.cvar95 <= r.var95);
        prop_assert!(r.portfolio_impact_pct <= 0.0);
    }

    #[test]
    fn monte_carlo_cvar_at_least_as_severe_as_var(
        returns in arb_returns(30),
        seed in any::<u64>(),
    ) {
        let portfolio = PortfolioSnapshot::from_positions(
            1_000.0,
            [Position::new("AAPL", 100.0, 150.0, 150.0)],
        );
        let engine = StressTestEngine::new(
            StressConfig::default(),
            BTreeMap::from([("AAPL".to_string(), returns)]),
        );
        let cfg = MonteCarloConfig { num_simulations: 200, time_horizon: 5, seed, ..MonteCarloConfig::default() };
        let s = engine.run_monte_carlo(&portfolio, &cfg, &RunControl::new()).unwrap();
        prop_assert!(s.var <= 0.0);
        prop_assert!(s.cvar <= s.var);
        prop_assert_eq!(s.simulations_run, 200);
    }
}
