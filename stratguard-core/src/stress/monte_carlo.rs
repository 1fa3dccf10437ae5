//! Monte Carlo simulation of portfolio value under log-normal random walks.
//!
//! Each symbol follows `ln S_{t+1} = ln S_t + μ + σ·Z` with `μ`, `σ` the mean
//! and standard deviation of its historical log returns (σ scaled by the
//! configured multiplier) and `Z` standard normal, independent across symbols.
//! Path `i` draws from the RNG hierarchy stream `("monte_carlo", i)`, so the
//! result does not depend on which worker ran which path.

use serde::{Deserialize, Serialize};

use rand::Rng;
use rand_distr::StandardNormal;

use crate::domain::PortfolioSnapshot;
use crate::rng::RngHierarchy;
use crate::stats::{mean, std_dev};

pub(crate) const MC_STREAM: &str = "monte_carlo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of independent paths (default 10,000).
    pub num_simulations: usize,
    /// Steps per path, in return periods (default 10).
    pub time_horizon: usize,
    /// VaR confidence in `(0.5, 1)` (default 0.95).
    pub confidence_level: f64,
    /// Master seed (default 42).
    pub seed: u64,
    /// Multiplier on historical volatility (default 1.0).
    pub volatility_multiplier: f64,
    /// Wall-clock budget in milliseconds (default none).
    pub timeout_ms: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            time_horizon: 10,
            confidence_level: 0.95,
            seed: 42,
            volatility_multiplier: 1.0,
            timeout_ms: None,
        }
    }
}

/// A point of the terminal-return distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentilePoint {
    /// Percentile in `[0, 100]`.
    pub percentile: f64,
    pub return_pct: f64,
}

/// The single worst simulated path, re-simulated from its seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstPath {
    pub path_index: usize,
    pub seed: u64,
    pub terminal_return_pct: f64,
    /// Portfolio value at each step, starting with the current value.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    /// Lower-percentile terminal return in percent, `<= 0`.
    pub var: f64,
    /// Mean terminal return at or beyond the VaR percentile, `<= var`.
    pub cvar: f64,
    pub confidence_level: f64,
    pub expected_return_pct: f64,
    pub worst_path: Option<WorstPath>,
    pub distribution: Vec<PercentilePoint>,
    pub simulations_run: usize,
    /// Held symbols with fewer than two returns; held at a constant price.
    pub symbols_without_history: Vec<String>,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Per-symbol simulation inputs.
#[derive(Debug, Clone)]
pub(crate) struct AssetModel {
    pub quantity: f64,
    pub price: f64,
    pub drift: f64,
    pub volatility: f64,
}

impl AssetModel {
    /// Drift and volatility from simple returns (converted to log returns).
    pub fn from_returns(quantity: f64, price: f64, returns: &[f64], vol_multiplier: f64) -> Option<Self> {
        let logs: Vec<f64> = returns
            .iter()
            .filter(|r| r.is_finite() && **r > -1.0)
            .map(|r| r.ln_1p())
            .collect();
        if logs.len() < 2 {
            return None;
        }
        Some(Self {
            quantity,
            price,
            drift: mean(&logs),
            volatility: std_dev(&logs) * vol_multiplier,
        })
    }

    /// Constant-price model for symbols without history.
    pub fn flat(quantity: f64, price: f64) -> Self {
        Self {
            quantity,
            price,
            drift: 0.0,
            volatility: 0.0,
        }
    }
}

/// Terminal portfolio value of path `index`, optionally recording each step.
pub(crate) fn simulate_path(
    hierarchy: &RngHierarchy,
    index: u64,
    cash: f64,
    assets: &[AssetModel],
    horizon: usize,
    mut trace: Option<&mut Vec<f64>>,
) -> f64 {
    let mut rng = hierarchy.rng_for(MC_STREAM, index);
    let mut log_prices: Vec<f64> = assets.iter().map(|a| a.price.ln()).collect();
    let value = |logs: &[f64]| -> f64 {
        cash + assets
            .iter()
            .zip(logs)
            .map(|(a, lp)| a.quantity * lp.exp())
            .sum::<f64>()
    };

    if let Some(t) = trace.as_mut() {
        t.push(value(&log_prices));
    }
    for _ in 0..horizon {
        for (asset, lp) in assets.iter().zip(log_prices.iter_mut()) {
            let z: f64 = rng.sample(StandardNormal);
            *lp += asset.drift + asset.volatility * z;
        }
        if let Some(t) = trace.as_mut() {
            t.push(value(&log_prices));
        }
    }
    value(&log_prices)
}

/// Percentile points reported in [`MonteCarloSummary::distribution`].
pub(crate) const REPORTED_PERCENTILES: [f64; 9] = [1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0];

pub(crate) fn starting_value(portfolio: &PortfolioSnapshot) -> f64 {
    portfolio.cash + portfolio.invested_value()
}
