//! Train → test performance degradation.

use serde::{Deserialize, Serialize};

/// Graded severity, shared by degradation and the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Severe,
}

impl Severity {
    /// Severity of a composite overfitting score in `[0, 1]`.
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 0.2 => Severity::None,
            s if s < 0.4 => Severity::Low,
            s if s < 0.6 => Severity::Medium,
            s if s < 0.8 => Severity::High,
            _ => Severity::Severe,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Severe => "severe",
        };
        f.pad(s)
    }
}

/// Relative drop from `train` to `test`: `(train − test) / |train|`.
///
/// - `train == 0`: 0 if `test >= 0`, else 1
/// - negative values mean the test period did better
/// - non-finite inputs count as total degradation (1.0)
pub fn degradation_pct(train: f64, test: f64) -> f64 {
    if !train.is_finite() || !test.is_finite() {
        return 1.0;
    }
    if train == 0.0 {
        return if test >= 0.0 { 0.0 } else { 1.0 };
    }
    (train - test) / train.abs()
}

/// `< 5%` none, `< 12.5%` low, `<= 20%` medium, `<= 40%` high, above severe.
pub fn degradation_severity(pct: f64) -> Severity {
    match pct {
        p if p < 0.05 => Severity::None,
        p if p < 0.125 => Severity::Low,
        p if p <= 0.20 => Severity::Medium,
        p if p <= 0.40 => Severity::High,
        _ => Severity::Severe,
    }
}

/// Risk contribution in `[0, 1]`: 0.5 at the pass threshold, 1.0 at twice it.
pub fn degradation_risk(pct: f64, max_degradation: f64) -> f64 {
    if max_degradation <= 0.0 {
        return if pct > 0.0 { 1.0 } else { 0.0 };
    }
    (pct / (2.0 * max_degradation)).clamp(0.0, 1.0)
}
