//! Strategy metrics — a closed, versioned schema plus the pure functions that fill it.
//!
//! Objectives report these alongside their score. They are informational
//! unless the optimizer is configured to rank by one of them.

use serde::{Deserialize, Serialize};

use crate::stats::{mean, std_dev};

/// Current [`StrategyMetrics`] schema version.
pub const METRICS_SCHEMA_VERSION: u32 = 1;

/// Trading periods per year used for annualization.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Reporting metrics for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyMetrics {
    pub schema_version: u32,
    /// Total return as a fraction.
    pub total_return: f64,
    /// Annualized Sharpe ratio (zero risk-free rate).
    pub sharpe: f64,
    /// Annualized Sortino ratio.
    pub sortino: f64,
    /// Maximum drawdown as a negative fraction (e.g. -0.15).
    pub max_drawdown: f64,
    /// Fraction of winning trades.
    pub win_rate: f64,
    /// Gross profit / gross loss, capped at 100.
    pub profit_factor: f64,
    pub trade_count: usize,
}

impl Default for StrategyMetrics {
    fn default() -> Self {
        Self {
            schema_version: METRICS_SCHEMA_VERSION,
            total_return: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            max_drawdown: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            trade_count: 0,
        }
    }
}

impl StrategyMetrics {
    /// Compute every metric from an equity curve and per-trade P&L.
    pub fn compute(equity_curve: &[f64], trade_pnls: &[f64]) -> Self {
        Self {
            schema_version: METRICS_SCHEMA_VERSION,
            total_return: total_return(equity_curve),
            sharpe: sharpe_ratio(equity_curve),
            sortino: sortino_ratio(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            win_rate: win_rate(trade_pnls),
            profit_factor: profit_factor(trade_pnls),
            trade_count: trade_pnls.len(),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// (final - initial) / initial. Zero for fewer than two points or a non-positive start.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&first), Some(&last)) if equity_curve.len() >= 2 && first > 0.0 => {
            (last - first) / first
        }
        _ => 0.0,
    }
}

/// Annualized Sharpe: mean / std of period returns × sqrt(252). Zero when std is zero.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let sd = std_dev(&returns);
    if sd < 1e-15 {
        return 0.0;
    }
    mean(&returns) / sd * PERIODS_PER_YEAR.sqrt()
}

/// Annualized Sortino: mean / downside deviation × sqrt(252). Zero with no downside.
pub fn sortino_ratio(equity_curve: &[f64]) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside <= 0.0 {
        return 0.0;
    }
    let dd = (downside / returns.len() as f64).sqrt();
    if dd < 1e-15 {
        return 0.0;
    }
    mean(&returns) / dd * PERIODS_PER_YEAR.sqrt()
}

/// Deepest peak-to-trough decline as a negative fraction.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            worst = worst.min((eq - peak) / peak);
        }
    }
    worst
}

pub fn win_rate(trade_pnls: &[f64]) -> f64 {
    if trade_pnls.is_empty() {
        return 0.0;
    }
    trade_pnls.iter().filter(|&&p| p > 0.0).count() as f64 / trade_pnls.len() as f64
}

/// Gross profits / gross losses, capped at 100 (also the value with no losses).
pub fn profit_factor(trade_pnls: &[f64]) -> f64 {
    let gross_profit: f64 = trade_pnls.iter().filter(|&&p| p > 0.0).sum();
    let gross_loss: f64 = trade_pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

/// Simple period returns of an equity curve (zero where the prior value is not positive).
pub fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}
