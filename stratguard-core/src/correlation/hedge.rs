//! Hedge recommendations from negatively correlated candidates.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::CorrelationManager;
use crate::domain::PortfolioSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeRecommendation {
    pub primary: String,
    pub hedge: String,
    pub correlation: f64,
    /// |β| of the primary's returns regressed on the hedge's returns.
    pub hedge_ratio: f64,
    /// Notional of the hedge leg: |primary market value| × hedge ratio.
    pub hedge_notional: f64,
    /// Units of the hedge at its latest known price.
    pub hedge_quantity: Option<f64>,
    pub reasoning: String,
}

pub(crate) fn recommend(
    manager: &CorrelationManager,
    portfolio: &PortfolioSnapshot,
    candidates: &[String],
) -> Vec<HedgeRecommendation> {
    let max_corr = manager.config().max_hedge_correlation;
    let mut out = Vec::new();

    for (primary, position) in &portfolio.positions {
        let mut best: Option<(&String, f64)> = None;
        for candidate in candidates.iter().filter(|c| *c != primary) {
            match manager.pairwise_correlation(primary, candidate) {
                Ok(c) if c < max_corr => {
                    if best.map_or(true, |(_, b)| c < b) {
                        best = Some((candidate, c));
                    }
                }
                Ok(_) => {}
                Err(e) => trace!(%primary, %candidate, error = %e, "hedge candidate skipped"),
            }
        }

        let Some((hedge, correlation)) = best else {
            continue;
        };
        let Ok(beta) = manager.beta(primary, hedge) else {
            continue;
        };
        let hedge_ratio = beta.abs();
        let hedge_notional = position.market_value().abs() * hedge_ratio;
        let hedge_quantity = manager
            .history(hedge)
            .and_then(|h| h.last().copied())
            .filter(|p| *p > 0.0)
            .map(|p| hedge_notional / p);

        out.push(HedgeRecommendation {
            primary: primary.clone(),
            hedge: hedge.clone(),
            correlation,
            hedge_ratio,
            hedge_notional,
            hedge_quantity,
            reasoning: reasoning(primary, hedge, correlation, hedge_ratio),
        });
    }
    out
}

fn reasoning(primary: &str, hedge: &str, correlation: f64, ratio: f64) -> String {
    let strength = match correlation.abs() {
        c if c >= 0.7 => "strong",
        c if c >= 0.5 => "moderate",
        _ => "weak",
    };
    format!(
        "{hedge} has a {strength} negative correlation ({correlation:.2}) with {primary}; \
         a hedge ratio of {ratio:.2} offsets {primary}'s return sensitivity"
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{mirror, walk};
    use super::super::CorrelationConfig;
    use super::*;
    use crate::domain::Position;

    #[test]
    fn picks_most_negative_candidate() {
        let mut m = CorrelationManager::new(CorrelationConfig::default());
        let base = walk(60, 11);
        m.update_history("SPY", &base).unwrap();
        m.update_history("INV", &mirror(&base)).unwrap();
        m.update_history("RND", &walk(60, 12)).unwrap();
        m.update_history("SAME", &base).unwrap();

        let p = PortfolioSnapshot::from_positions(0.0, [Position::new("SPY", 10.0, 100.0, 100.0)]);
        let candidates: Vec<String> = ["SAME", "RND", "INV"].iter().map(|s| s.to_string()).collect();
        let recs = recommend(&m, &p, &candidates);
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.hedge, "INV");
        assert!((r.correlation + 1.0).abs() < 1e-9);
        assert!((r.hedge_ratio - 1.0).abs() < 1e-9);
        assert!((r.hedge_notional - 1_000.0).abs() < 1e-6);
        assert!(r.hedge_quantity.is_some());
        assert!(r.reasoning.contains("strong"));
    }

    #[test]
    fn no_recommendation_without_negative_candidate() {
        let mut m = CorrelationManager::new(CorrelationConfig::default());
        let base = walk(60, 13);
        m.update_history("SPY", &base).unwrap();
        m.update_history("SAME", &base).unwrap();
        let p = PortfolioSnapshot::from_positions(0.0, [Position::new("SPY", 10.0, 100.0, 100.0)]);
        assert!(recommend(&m, &p, &["SAME".to_string(), "MISSING".to_string()]).is_empty());
    }
}
