//! Ljung–Box test on out-of-sample residuals.
//!
//! `Q = n(n+2) Σₖ ρ̂ₖ² / (n−k)` for `k = 1..=h`, `h = min(max_lags, n/4)`,
//! compared against χ²(h). Residuals that are white noise give large p-values;
//! autocorrelated residuals (a strategy that keeps fitting the same regime)
//! give small ones.

use serde::{Deserialize, Serialize};

use stratguard_core::stats::{autocorrelation_demeaned, chi_square_sf, mean};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LjungBox {
    pub q_statistic: f64,
    pub p_value: f64,
    pub lags: usize,
    pub observations: usize,
    /// Too few residuals; `p_value` is 1.
    pub skipped: bool,
}

pub fn ljung_box(residuals: &[f64], max_lags: usize, min_residuals: usize) -> LjungBox {
    let finite: Vec<f64> = residuals.iter().copied().filter(|r| r.is_finite()).collect();
    let n = finite.len();
    if n < min_residuals.max(2) {
        return LjungBox {
            q_statistic: 0.0,
            p_value: 1.0,
            lags: 0,
            observations: n,
            skipped: true,
        };
    }

    let m = mean(&finite);
    let centered: Vec<f64> = finite.iter().map(|r| r - m).collect();
    let h = max_lags.min(n / 4).max(1);
    // Constant residuals: nothing to correlate.
    if centered.iter().all(|c| c.abs() < 1e-12) {
        return LjungBox {
            q_statistic: 0.0,
            p_value: 1.0,
            lags: h,
            observations: n,
            skipped: false,
        };
    }
    let n_f = n as f64;
    let q = n_f
        * (n_f + 2.0)
        * (1..=h)
            .map(|k| autocorrelation_demeaned(&centered, k).powi(2) / (n_f - k as f64))
            .sum::<f64>();

    LjungBox {
        q_statistic: q,
        p_value: chi_square_sf(q, h as f64),
        lags: h,
        observations: n,
        skipped: false,
    }
}

/// Risk contribution in `[0, 1]`: 0 for `p >= 0.20`, 1 for `p <= 0.05`.
pub fn white_noise_risk(p_value: f64) -> f64 {
    ((0.20 - p_value) / 0.15).clamp(0.0, 1.0)
}
