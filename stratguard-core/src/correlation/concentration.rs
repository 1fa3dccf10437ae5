//! Concentration risk — position weights and the Herfindahl index.

use serde::{Deserialize, Serialize};

use crate::domain::PortfolioSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationEntry {
    pub symbol: String,
    /// |market value| / portfolio total value.
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationReport {
    pub threshold: f64,
    /// Holdings above `threshold`, heaviest first.
    pub flagged: Vec<ConcentrationEntry>,
    /// Σ w² over holdings, with weights normalized to the invested total.
    /// 1.0 for a single holding, 1/n for n equal holdings, 0.0 when flat.
    pub herfindahl_index: f64,
    /// 1 / HHI (0.0 when flat).
    pub effective_positions: f64,
}

pub(crate) fn analyze(portfolio: &PortfolioSnapshot, threshold: f64) -> ConcentrationReport {
    let weights = portfolio.weights();

    let mut flagged: Vec<ConcentrationEntry> = weights
        .iter()
        .filter(|(_, &w)| w > threshold)
        .map(|(s, &w)| ConcentrationEntry {
            symbol: s.clone(),
            weight: w,
        })
        .collect();
    flagged.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.symbol.cmp(&b.symbol)));

    let gross: f64 = portfolio
        .positions
        .values()
        .map(|p| p.market_value().abs())
        .sum();
    let herfindahl_index = if gross > 0.0 {
        portfolio
            .positions
            .values()
            .map(|p| (p.market_value().abs() / gross).powi(2))
            .sum()
    } else {
        0.0
    };
    let effective_positions = if herfindahl_index > 0.0 {
        1.0 / herfindahl_index
    } else {
        0.0
    };

    ConcentrationReport {
        threshold,
        flagged,
        herfindahl_index,
        effective_positions,
    }
}
