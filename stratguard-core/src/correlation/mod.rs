//! Correlation management — rolling price histories, pairwise correlation,
//! concentration and hedge analysis.
//!
//! A [`CorrelationManager`] is a caller-owned cache: it holds a bounded
//! per-symbol price history and nothing else. Correlations are Pearson over
//! tail-aligned simple-return series. Undefined correlations are reported as
//! errors (or listed under `insufficient_data` in a matrix), never coerced to 0.

pub mod alerts;
pub mod concentration;
pub mod hedge;

pub use alerts::{AlertSeverity, RiskAlert, RiskAlertKind};
pub use concentration::{ConcentrationEntry, ConcentrationReport};
pub use hedge::HedgeRecommendation;

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::domain::PortfolioSnapshot;
use crate::error::ErrorKind;
use crate::stats::{covariance, pearson, simple_returns, variance};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Maximum prices retained per symbol (default 252).
    pub max_history: usize,
    /// Minimum overlapping returns for a correlation (default 30).
    pub min_observations: usize,
    /// Position weight above which a holding is flagged (default 0.25).
    pub concentration_threshold: f64,
    /// Herfindahl index above which the portfolio is flagged (default 0.25).
    pub max_herfindahl: f64,
    /// Pairwise correlation above which two holdings are flagged (default 0.8).
    pub high_correlation: f64,
    /// A hedge candidate must correlate below this with the primary (default -0.3).
    pub max_hedge_correlation: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_history: 252,
            min_observations: 30,
            concentration_threshold: 0.25,
            max_herfindahl: 0.25,
            high_correlation: 0.8,
            max_hedge_correlation: -0.3,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrelationError {
    #[error("no price history for '{0}'")]
    UnknownSymbol(String),
    #[error("insufficient history for {a}/{b}: {observations} overlapping returns, need {required}")]
    InsufficientHistory {
        a: String,
        b: String,
        observations: usize,
        required: usize,
    },
    #[error("correlation undefined for {a}/{b}: zero variance")]
    Undefined { a: String, b: String },
    #[error("invalid price {price} for '{symbol}'")]
    InvalidPrice { symbol: String, price: f64 },
}

impl CorrelationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CorrelationError::UnknownSymbol(_) | CorrelationError::InsufficientHistory { .. } => {
                ErrorKind::InsufficientData
            }
            CorrelationError::Undefined { .. } | CorrelationError::InvalidPrice { .. } => {
                ErrorKind::DegenerateInput
            }
        }
    }
}

// ─── Matrix ──────────────────────────────────────────────────────────

/// Correlation of one unordered pair. `a` precedes `b` in
/// [`CorrelationMatrix::symbols`], i.e. first-seen input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCorrelation {
    pub a: String,
    pub b: String,
    pub correlation: f64,
    pub observations: usize,
}

/// A pair whose correlation could not be computed, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndefinedPair {
    pub a: String,
    pub b: String,
    pub reason: String,
}

/// Pairwise correlations of a symbol set. The diagonal is implicitly 1.0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub pairs: Vec<PairCorrelation>,
    pub insufficient_data: Vec<UndefinedPair>,
}

impl CorrelationMatrix {
    /// Correlation of `a` and `b` in either order; 1.0 on the diagonal.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        if a == b {
            return self.symbols.iter().any(|s| s == a).then_some(1.0);
        }
        self.pairs
            .iter()
            .find(|p| (p.a == a && p.b == b) || (p.a == b && p.b == a))
            .map(|p| p.correlation)
    }

    /// Defined correlations of `symbol` with every other symbol.
    pub fn row(&self, symbol: &str) -> BTreeMap<String, f64> {
        self.pairs
            .iter()
            .filter_map(|p| {
                if p.a == symbol {
                    Some((p.b.clone(), p.correlation))
                } else if p.b == symbol {
                    Some((p.a.clone(), p.correlation))
                } else {
                    None
                }
            })
            .collect()
    }
}

// ─── Manager ─────────────────────────────────────────────────────────

/// Caller-owned rolling price history with correlation analytics.
#[derive(Debug, Clone, Default)]
pub struct CorrelationManager {
    config: CorrelationConfig,
    history: BTreeMap<String, VecDeque<f64>>,
}

impl CorrelationManager {
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            history: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    /// Append prices (oldest first) to a symbol's history, evicting the
    /// oldest beyond `max_history`.
    pub fn update_history(&mut self, symbol: &str, prices: &[f64]) -> Result<(), CorrelationError> {
        if let Some(&bad) = prices.iter().find(|p| !(p.is_finite() && **p > 0.0)) {
            return Err(CorrelationError::InvalidPrice {
                symbol: symbol.to_string(),
                price: bad,
            });
        }
        let max = self.config.max_history.max(2);
        let series = self.history.entry(symbol.to_string()).or_default();
        series.extend(prices.iter().copied());
        while series.len() > max {
            series.pop_front();
        }
        trace!(symbol, len = series.len(), "price history updated");
        Ok(())
    }

    pub fn history(&self, symbol: &str) -> Option<Vec<f64>> {
        self.history.get(symbol).map(|s| s.iter().copied().collect())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &String> {
        self.history.keys()
    }

    /// Forget every symbol.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn clear_symbol(&mut self, symbol: &str) {
        self.history.remove(symbol);
    }

    /// Tail-aligned simple returns of two symbols.
    fn aligned_returns(&self, a: &str, b: &str) -> Result<(Vec<f64>, Vec<f64>), CorrelationError> {
        let pa = self
            .history
            .get(a)
            .ok_or_else(|| CorrelationError::UnknownSymbol(a.to_string()))?;
        let pb = self
            .history
            .get(b)
            .ok_or_else(|| CorrelationError::UnknownSymbol(b.to_string()))?;
        let n = pa.len().min(pb.len());
        let tail = |s: &VecDeque<f64>| -> Vec<f64> { s.iter().skip(s.len() - n).copied().collect() };
        let ra = simple_returns(&tail(pa));
        let rb = simple_returns(&tail(pb));
        if ra.len() < self.config.min_observations {
            return Err(CorrelationError::InsufficientHistory {
                a: a.to_string(),
                b: b.to_string(),
                observations: ra.len(),
                required: self.config.min_observations,
            });
        }
        Ok((ra, rb))
    }

    /// Pearson correlation of two symbols' returns.
    pub fn pairwise_correlation(&self, a: &str, b: &str) -> Result<f64, CorrelationError> {
        let (ra, rb) = self.aligned_returns(a, b)?;
        pearson(&ra, &rb).ok_or_else(|| CorrelationError::Undefined {
            a: a.to_string(),
            b: b.to_string(),
        })
    }

    /// Regression beta of `a`'s returns on `b`'s returns: `cov(a, b) / var(b)`.
    pub fn beta(&self, a: &str, b: &str) -> Result<f64, CorrelationError> {
        let (ra, rb) = self.aligned_returns(a, b)?;
        let var_b = variance(&rb);
        if var_b < 1e-300 {
            return Err(CorrelationError::Undefined {
                a: a.to_string(),
                b: b.to_string(),
            });
        }
        Ok(covariance(&ra, &rb) / var_b)
    }

    /// Correlation of every unordered pair of `symbols` (duplicates ignored).
    pub fn correlation_matrix(&self, symbols: &[String]) -> CorrelationMatrix {
        let mut unique: Vec<String> = Vec::with_capacity(symbols.len());
        for s in symbols {
            if !unique.contains(s) {
                unique.push(s.clone());
            }
        }

        let mut matrix = CorrelationMatrix {
            symbols: unique.clone(),
            ..CorrelationMatrix::default()
        };
        for (i, a) in unique.iter().enumerate() {
            for b in &unique[i + 1..] {
                match self.aligned_returns(a, b).and_then(|(ra, rb)| {
                    pearson(&ra, &rb)
                        .map(|c| (c, ra.len()))
                        .ok_or_else(|| CorrelationError::Undefined {
                            a: a.clone(),
                            b: b.clone(),
                        })
                }) {
                    Ok((correlation, observations)) => matrix.pairs.push(PairCorrelation {
                        a: a.clone(),
                        b: b.clone(),
                        correlation,
                        observations,
                    }),
                    Err(e) => matrix.insufficient_data.push(UndefinedPair {
                        a: a.clone(),
                        b: b.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
        }
        matrix
    }

    /// Holdings whose weight exceeds `threshold`, plus the Herfindahl index.
    pub fn detect_concentration_risk(
        &self,
        portfolio: &PortfolioSnapshot,
        threshold: f64,
    ) -> ConcentrationReport {
        concentration::analyze(portfolio, threshold)
    }

    /// For each holding, the most negatively correlated candidate.
    pub fn recommend_hedges(
        &self,
        portfolio: &PortfolioSnapshot,
        candidates: &[String],
    ) -> Vec<HedgeRecommendation> {
        hedge::recommend(self, portfolio, candidates)
    }

    /// Pull-based risk alerts for the current portfolio.
    pub fn assess(&self, portfolio: &PortfolioSnapshot) -> Vec<RiskAlert> {
        alerts::assess(self, portfolio)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Deterministic, non-degenerate price walk.
    pub fn walk(n: usize, seed: u64) -> Vec<f64> {
        let mut price = 100.0;
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let u = (state >> 11) as f64 / (1u64 << 53) as f64;
                price *= 1.0 + (u - 0.5) * 0.04;
                price
            })
            .collect()
    }

    /// Mirror image of a price walk: returns have the opposite sign.
    pub fn mirror(prices: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(prices.len());
        let mut p = prices[0];
        out.push(p);
        for w in prices.windows(2) {
            let r = w[1] / w[0] - 1.0;
            p *= 1.0 - r;
            out.push(p);
        }
        out
    }
}
