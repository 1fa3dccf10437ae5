//! Stress testing — deterministic scenarios and Monte Carlo simulation.
//!
//! - Scenarios apply a price shock (uniform or per symbol) and report the
//!   portfolio impact, the worst position and parametric one-period VaR/CVaR
//!   with volatility scaled by the scenario's multiplier.
//! - Monte Carlo runs independent log-normal paths in parallel (rayon), seeded
//!   per path from the RNG hierarchy, and reports percentile VaR/CVaR of the
//!   terminal return.
//!
//! Losses are negative percentages: `cvar <= var <= 0` for both methods.

pub mod monte_carlo;
pub mod scenario;

pub use monte_carlo::{MonteCarloConfig, MonteCarloSummary, PercentilePoint, WorstPath};
pub use scenario::{default_scenarios, StressScenario};

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cancel::{RunControl, StopReason};
use crate::domain::PortfolioSnapshot;
use crate::error::ErrorKind;
use crate::rng::RngHierarchy;
use crate::stats::{mean, normal_pdf, normal_quantile, percentile_sorted, std_dev};
use monte_carlo::{simulate_path, starting_value, AssetModel, REPORTED_PERCENTILES};

/// Confidence of the parametric scenario VaR/CVaR.
pub const PARAMETRIC_CONFIDENCE: f64 = 0.95;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Scenarios run by `run_multiple_scenarios` (default: the five documented ones).
    pub scenarios: Vec<StressScenario>,
    /// Per-period volatility assumed for holdings without return history (default 0.02).
    pub fallback_volatility: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            scenarios: default_scenarios(),
            fallback_volatility: 0.02,
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// P&L of one holding under a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionImpact {
    pub symbol: String,
    pub pnl: f64,
    /// Change of the position's own value, in percent.
    pub impact_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: String,
    /// (stressed − current) / current × 100.
    pub portfolio_impact_pct: f64,
    pub current_value: f64,
    pub stressed_value: f64,
    /// Largest loss, if any position loses.
    pub worst_position: Option<PositionImpact>,
    pub position_impacts: Vec<PositionImpact>,
    /// Parametric one-period 95% VaR in percent of portfolio value, `<= 0`.
    pub var95: f64,
    /// Parametric one-period 95% CVaR in percent, `<= var95`.
    pub cvar95: f64,
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StressError {
    #[error("portfolio value must be positive, got {0}")]
    NonPositiveValue(f64),
    #[error("position '{symbol}' has invalid current price {price}")]
    InvalidPrice { symbol: String, price: f64 },
    #[error("invalid Monte Carlo configuration: {0}")]
    InvalidConfig(String),
}

impl StressError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StressError::NonPositiveValue(_) | StressError::InvalidPrice { .. } => {
                ErrorKind::DegenerateInput
            }
            StressError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

/// Stress tester over a per-symbol history of simple returns.
#[derive(Debug, Clone)]
pub struct StressTestEngine {
    config: StressConfig,
    returns: BTreeMap<String, Vec<f64>>,
}

impl StressTestEngine {
    /// `returns` holds per-symbol simple returns, oldest first.
    pub fn new(config: StressConfig, returns: BTreeMap<String, Vec<f64>>) -> Self {
        Self { config, returns }
    }

    /// Build from per-symbol price histories.
    pub fn from_prices(config: StressConfig, prices: &BTreeMap<String, Vec<f64>>) -> Self {
        let returns = prices
            .iter()
            .map(|(s, p)| (s.clone(), crate::stats::simple_returns(p)))
            .collect();
        Self::new(config, returns)
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    pub fn scenarios(&self) -> &[StressScenario] {
        &self.config.scenarios
    }

    /// Apply one scenario to the portfolio.
    ///
    /// A non-positive portfolio value yields a 0% impact.
    pub fn run_scenario(&self, scenario: &StressScenario, portfolio: &PortfolioSnapshot) -> StressResult {
        let current_value = portfolio.total_value;

        let position_impacts: Vec<PositionImpact> = portfolio
            .positions
            .values()
            .map(|p| {
                let shock = scenario.shock_for(&p.symbol);
                let pnl = p.quantity * p.current_price * shock;
                PositionImpact {
                    symbol: p.symbol.clone(),
                    pnl,
                    impact_pct: if p.quantity >= 0.0 { shock } else { -shock } * 100.0,
                }
            })
            .collect();

        let total_pnl: f64 = position_impacts.iter().map(|i| i.pnl).sum();
        let stressed_value = current_value + total_pnl;
        let portfolio_impact_pct = if current_value > 0.0 {
            (stressed_value - current_value) / current_value * 100.0
        } else {
            0.0
        };

        let worst_position = position_impacts
            .iter()
            .filter(|i| i.pnl < 0.0)
            .min_by(|a, b| a.pnl.total_cmp(&b.pnl))
            .cloned();

        let sigma = self.portfolio_volatility(portfolio) * scenario.volatility_multiplier.max(0.0);
        let (var95, cvar95) = parametric_var(sigma, PARAMETRIC_CONFIDENCE);

        StressResult {
            scenario: scenario.name.clone(),
            portfolio_impact_pct,
            current_value,
            stressed_value,
            worst_position,
            position_impacts,
            var95,
            cvar95,
        }
    }

    /// Run every configured scenario, in configuration order.
    pub fn run_multiple_scenarios(&self, portfolio: &PortfolioSnapshot) -> Vec<StressResult> {
        self.config
            .scenarios
            .iter()
            .map(|s| self.run_scenario(s, portfolio))
            .collect()
    }

    /// One-period volatility of portfolio returns (fraction).
    ///
    /// Holdings with at least two returns contribute through the standard
    /// deviation of their value-weighted, tail-aligned return series (so
    /// historical co-movement is kept). Holdings without history add
    /// `weight × fallback_volatility` in quadrature.
    pub fn portfolio_volatility(&self, portfolio: &PortfolioSnapshot) -> f64 {
        let total = portfolio.total_value;
        if total <= 0.0 {
            return 0.0;
        }

        let mut with_history: Vec<(f64, &[f64])> = Vec::new();
        let mut fallback_var = 0.0;
        for p in portfolio.positions.values() {
            let w = p.market_value() / total;
            match self.returns.get(&p.symbol) {
                Some(r) if r.len() >= 2 => with_history.push((w, r.as_slice())),
                _ => fallback_var += (w * self.config.fallback_volatility).powi(2),
            }
        }

        let hist_sd = match with_history.iter().map(|(_, r)| r.len()).min() {
            Some(n) => {
                let series: Vec<f64> = (0..n)
                    .map(|t| {
                        with_history
                            .iter()
                            .map(|(w, r)| w * r[r.len() - n + t])
                            .sum()
                    })
                    .collect();
                std_dev(&series)
            }
            None => 0.0,
        };
        (hist_sd * hist_sd + fallback_var).sqrt()
    }

    /// Simulate terminal portfolio returns over `time_horizon` periods.
    pub fn run_monte_carlo(
        &self,
        portfolio: &PortfolioSnapshot,
        config: &MonteCarloConfig,
        control: &RunControl,
    ) -> Result<MonteCarloSummary, StressError> {
        validate_mc(config)?;
        // Paths evolve in log space.
        if let Some(p) = portfolio
            .positions
            .values()
            .find(|p| p.quantity != 0.0 && !(p.current_price.is_finite() && p.current_price > 0.0))
        {
            return Err(StressError::InvalidPrice {
                symbol: p.symbol.clone(),
                price: p.current_price,
            });
        }
        let start_value = starting_value(portfolio);
        if !(start_value.is_finite() && start_value > 0.0) {
            return Err(StressError::NonPositiveValue(start_value));
        }

        let mut symbols_without_history = Vec::new();
        let assets: Vec<AssetModel> = portfolio
            .positions
            .values()
            .filter(|p| p.quantity != 0.0)
            .map(|p| {
                self.returns
                    .get(&p.symbol)
                    .and_then(|r| {
                        AssetModel::from_returns(p.quantity, p.current_price, r, config.volatility_multiplier)
                    })
                    .unwrap_or_else(|| {
                        symbols_without_history.push(p.symbol.clone());
                        AssetModel::flat(p.quantity, p.current_price)
                    })
            })
            .collect();

        let control = control.tightened(config.timeout_ms.map(Duration::from_millis));
        let hierarchy = RngHierarchy::new(config.seed);
        let started = Instant::now();

        let terminal: Vec<Option<f64>> = (0..config.num_simulations)
            .into_par_iter()
            .map(|i| {
                if control.should_stop() {
                    return None;
                }
                let v = simulate_path(&hierarchy, i as u64, portfolio.cash, &assets, config.time_horizon, None);
                Some((v - start_value) / start_value * 100.0)
            })
            .collect();

        let completed: Vec<(usize, f64)> = terminal
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.map(|r| (i, r)))
            .collect();
        let stop = if completed.len() < config.num_simulations {
            control.stop_reason()
        } else {
            None
        };

        let mut sorted: Vec<f64> = completed.iter().map(|(_, r)| *r).collect();
        sorted.sort_by(f64::total_cmp);

        let (var, cvar) = if sorted.is_empty() {
            (0.0, 0.0)
        } else {
            let threshold = percentile_sorted(&sorted, 1.0 - config.confidence_level);
            let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= threshold).collect();
            let var = threshold.min(0.0);
            let tail_mean = if tail.is_empty() { threshold } else { mean(&tail) };
            (var, tail_mean.min(var))
        };

        let worst_path = completed
            .iter()
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
            .map(|&(index, terminal_return_pct)| {
                let mut values = Vec::with_capacity(config.time_horizon + 1);
                simulate_path(
                    &hierarchy,
                    index as u64,
                    portfolio.cash,
                    &assets,
                    config.time_horizon,
                    Some(&mut values),
                );
                WorstPath {
                    path_index: index,
                    seed: hierarchy.sub_seed(monte_carlo::MC_STREAM, index as u64),
                    terminal_return_pct,
                    values,
                }
            });

        let distribution = if sorted.is_empty() {
            Vec::new()
        } else {
            REPORTED_PERCENTILES
                .iter()
                .map(|&p| PercentilePoint {
                    percentile: p,
                    return_pct: percentile_sorted(&sorted, p / 100.0),
                })
                .collect()
        };

        debug!(
            simulations = sorted.len(),
            var,
            cvar,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "monte carlo finished"
        );

        Ok(MonteCarloSummary {
            var,
            cvar,
            confidence_level: config.confidence_level,
            expected_return_pct: mean(&sorted),
            worst_path,
            distribution,
            simulations_run: sorted.len(),
            symbols_without_history,
            timed_out: stop == Some(StopReason::TimedOut),
            cancelled: stop == Some(StopReason::Cancelled),
        })
    }
}

fn validate_mc(config: &MonteCarloConfig) -> Result<(), StressError> {
    if config.num_simulations == 0 {
        return Err(StressError::InvalidConfig("num_simulations must be > 0".into()));
    }
    if config.time_horizon == 0 {
        return Err(StressError::InvalidConfig("time_horizon must be > 0".into()));
    }
    if !(config.confidence_level > 0.5 && config.confidence_level < 1.0) {
        return Err(StressError::InvalidConfig(format!(
            "confidence_level must be in (0.5, 1), got {}",
            config.confidence_level
        )));
    }
    if !(config.volatility_multiplier.is_finite() && config.volatility_multiplier >= 0.0) {
        return Err(StressError::InvalidConfig(
            "volatility_multiplier must be >= 0".into(),
        ));
    }
    Ok(())
}

/// Normal parametric VaR and CVaR of a zero-mean return with volatility
/// `sigma`, in percent, as losses (`cvar <= var <= 0`).
pub fn parametric_var(sigma: f64, confidence: f64) -> (f64, f64) {
    if !(sigma.is_finite() && sigma > 0.0) {
        return (0.0, 0.0);
    }
    let z = normal_quantile(confidence);
    let var = -z * sigma * 100.0;
    let cvar = -normal_pdf(z) / (1.0 - confidence) * sigma * 100.0;
    (var, cvar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::domain::Position;

    fn aapl() -> PortfolioSnapshot {
        PortfolioSnapshot::from_positions(0.0, [Position::new("AAPL", 100.0, 150.0, 150.0)])
    }

    fn history() -> BTreeMap<String, Vec<f64>> {
        let returns: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 0.012 } else { -0.010 })
            .collect();
        BTreeMap::from([("AAPL".to_string(), returns)])
    }

    fn engine() -> StressTestEngine {
        StressTestEngine::new(StressConfig::default(), history())
    }

    #[test]
    fn market_crash_is_minus_twenty_percent() {
        let e = engine();
        let crash = &e.scenarios()[0];
        let r = e.run_scenario(crash, &aapl());
        assert!((r.portfolio_impact_pct - (-20.0)).abs() < 1e-9);
        assert!((r.stressed_value - 12_000.0).abs() < 1e-9);
        let worst = r.worst_position.unwrap();
        assert_eq!(worst.symbol, "AAPL");
        assert!((worst.pnl + 3_000.0).abs() < 1e-9);
    }

    #[test]
    fn cash_dilutes_impact() {
        let p = PortfolioSnapshot::from_positions(15_000.0, [Position::new("AAPL", 100.0, 150.0, 150.0)]);
        let r = engine().run_scenario(&StressScenario::new("x", -0.20, 1.0), &p);
        assert!((r.portfolio_impact_pct + 10.0).abs() < 1e-9);
    }

    #[test]
    fn short_positions_gain_in_a_crash() {
        let p = PortfolioSnapshot::from_positions(
            30_000.0,
            [Position::new("AAPL", -100.0, 150.0, 150.0)],
        );
        let r = engine().run_scenario(&StressScenario::new("x", -0.20, 1.0), &p);
        assert!(r.portfolio_impact_pct > 0.0);
        assert!(r.worst_position.is_none());
    }

    #[test]
    fn per_symbol_shock_overrides() {
        let p = PortfolioSnapshot::from_positions(
            0.0,
            [
                Position::new("A", 10.0, 100.0, 100.0),
                Position::new("B", 10.0, 100.0, 100.0),
            ],
        );
        let s = StressScenario::new("x", -0.10, 1.0).with_symbol_shock("B", -0.50);
        let r = engine().run_scenario(&s, &p);
        assert!((r.portfolio_impact_pct + 30.0).abs() < 1e-9);
        assert_eq!(r.worst_position.unwrap().symbol, "B");
    }

    #[test]
    fn parametric_var_ordering_and_scaling() {
        let e = engine();
        let results = e.run_multiple_scenarios(&aapl());
        assert_eq!(results.len(), 5);
        for r in &results {
            assert!(r.var95 <= 0.0);
            assert!(r.cvar95 <= r.var95);
        }
        // Black Swan (10x) is more severe than Moderate Correction (1.5x).
        assert!(results[4].var95 < results[2].var95);
        let (var, cvar) = parametric_var(0.01, 0.95);
        assert!((var + 1.644_853_6).abs() < 1e-5);
        assert!((cvar + 2.062_712_9).abs() < 1e-5);
        assert_eq!(parametric_var(0.0, 0.95), (0.0, 0.0));
    }

    #[test]
    fn fallback_volatility_for_unknown_symbols() {
        let e = StressTestEngine::new(StressConfig::default(), BTreeMap::new());
        let vol = e.portfolio_volatility(&aapl());
        assert!((vol - 0.02).abs() < 1e-12);
    }

    #[test]
    fn monte_carlo_is_reproducible_and_ordered() {
        let e = engine();
        let cfg = MonteCarloConfig {
            num_simulations: 500,
            time_horizon: 5,
            ..MonteCarloConfig::default()
        };
        let a = e.run_monte_carlo(&aapl(), &cfg, &RunControl::new()).unwrap();
        let b = e.run_monte_carlo(&aapl(), &cfg, &RunControl::new()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.simulations_run, 500);
        assert!(a.var <= 0.0);
        assert!(a.cvar <= a.var);
        assert_eq!(a.distribution.len(), 9);
        let worst = a.worst_path.as_ref().unwrap();
        assert_eq!(worst.values.len(), 6);
        let terminal = worst.values[5];
        assert!(((terminal - 15_000.0) / 15_000.0 * 100.0 - worst.terminal_return_pct).abs() < 1e-9);
        assert!(worst.terminal_return_pct <= a.distribution[0].return_pct);
    }

    #[test]
    fn monte_carlo_without_history_is_flat() {
        let e = StressTestEngine::new(StressConfig::default(), BTreeMap::new());
        let cfg = MonteCarloConfig {
            num_simulations: 50,
            ..MonteCarloConfig::default()
        };
        let s = e.run_monte_carlo(&aapl(), &cfg, &RunControl::new()).unwrap();
        assert_eq!(s.symbols_without_history, vec!["AAPL".to_string()]);
        assert!(s.var.abs() < 1e-9);
        assert!(s.cvar.abs() < 1e-9);
    }

    #[test]
    fn monte_carlo_cancelled_is_a_flag() {
        let token = CancellationToken::new();
        token.cancel();
        let control = RunControl::new().with_cancel(token);
        let s = engine()
            .run_monte_carlo(&aapl(), &MonteCarloConfig::default(), &control)
            .unwrap();
        assert!(s.cancelled);
        assert!(!s.timed_out);
        assert_eq!(s.simulations_run, 0);
        assert!(s.worst_path.is_none());
    }

    #[test]
    fn monte_carlo_rejects_bad_config() {
        let cfg = MonteCarloConfig {
            confidence_level: 1.0,
            ..MonteCarloConfig::default()
        };
        let err = engine().run_monte_carlo(&aapl(), &cfg, &RunControl::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let empty = PortfolioSnapshot::default();
        let err = engine()
            .run_monte_carlo(&empty, &MonteCarloConfig::default(), &RunControl::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateInput);
    }

    #[test]
    fn monte_carlo_rejects_unpriced_holdings() {
        let cfg = MonteCarloConfig {
            num_simulations: 20,
            ..MonteCarloConfig::default()
        };
        for price in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let p = PortfolioSnapshot::from_positions(
                10_000.0,
                [Position::new("AAPL", 100.0, 150.0, 150.0), Position::new("BAD", 10.0, 1.0, price)],
            );
            let err = engine().run_monte_carlo(&p, &cfg, &RunControl::new()).unwrap_err();
            assert!(matches!(err, StressError::InvalidPrice { ref symbol, .. } if symbol == "BAD"), "price {price}");
            assert_eq!(err.kind(), ErrorKind::DegenerateInput);
        }

        // A closed position's stale price is irrelevant.
        let p = PortfolioSnapshot::from_positions(
            10_000.0,
            [Position::new("AAPL", 100.0, 150.0, 150.0), Position::new("OLD", 0.0, 1.0, 0.0)],
        );
        let s = engine().run_monte_carlo(&p, &cfg, &RunControl::new()).unwrap();
        assert!(s.var.is_finite() && s.cvar.is_finite());
    }
}
