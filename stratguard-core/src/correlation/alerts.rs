//! Pull-based risk alerts.
//!
//! Callers ask for the current alert list; nothing is pushed or emitted.

use serde::{Deserialize, Serialize};

use super::CorrelationManager;
use crate::domain::PortfolioSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAlertKind {
    /// A single holding above the concentration threshold.
    Concentration,
    /// Portfolio Herfindahl index above its limit.
    Herfindahl,
    /// Two holdings correlated above the high-correlation threshold.
    HighCorrelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    /// Value at least 1.5× past its threshold (or correlation >= 0.95).
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: RiskAlertKind,
    pub severity: AlertSeverity,
    pub symbols: Vec<String>,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

pub(crate) fn assess(manager: &CorrelationManager, portfolio: &PortfolioSnapshot) -> Vec<RiskAlert> {
    let cfg = manager.config();
    let mut alerts = Vec::new();

    let report = manager.detect_concentration_risk(portfolio, cfg.concentration_threshold);
    for entry in &report.flagged {
        alerts.push(RiskAlert {
            kind: RiskAlertKind::Concentration,
            severity: ratio_severity(entry.weight, cfg.concentration_threshold),
            symbols: vec![entry.symbol.clone()],
            value: entry.weight,
            threshold: cfg.concentration_threshold,
            message: format!(
                "{} is {:.1}% of the portfolio (limit {:.1}%)",
                entry.symbol,
                entry.weight * 100.0,
                cfg.concentration_threshold * 100.0
            ),
        });
    }

    if report.herfindahl_index > cfg.max_herfindahl {
        alerts.push(RiskAlert {
            kind: RiskAlertKind::Herfindahl,
            severity: ratio_severity(report.herfindahl_index, cfg.max_herfindahl),
            symbols: portfolio.positions.keys().cloned().collect(),
            value: report.herfindahl_index,
            threshold: cfg.max_herfindahl,
            message: format!(
                "Herfindahl index {:.3} exceeds {:.3} ({:.1} effective positions)",
                report.herfindahl_index, cfg.max_herfindahl, report.effective_positions
            ),
        });
    }

    let held: Vec<String> = portfolio
        .positions
        .iter()
        .filter(|(_, p)| p.quantity != 0.0)
        .map(|(s, _)| s.clone())
        .collect();
    let matrix = manager.correlation_matrix(&held);
    for pair in matrix.pairs.iter().filter(|p| p.correlation > cfg.high_correlation) {
        alerts.push(RiskAlert {
            kind: RiskAlertKind::HighCorrelation,
            severity: if pair.correlation >= 0.95 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            },
            symbols: vec![pair.a.clone(), pair.b.clone()],
            value: pair.correlation,
            threshold: cfg.high_correlation,
            message: format!(
                "{} and {} are highly correlated ({:.2})",
                pair.a, pair.b, pair.correlation
            ),
        });
    }

    alerts
}

fn ratio_severity(value: f64, threshold: f64) -> AlertSeverity {
    if threshold > 0.0 && value >= 1.5 * threshold {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}
