//! Kelly criterion
//!
//! # Formula
//! ```text
//! raw      = win_rate - (1 - win_rate) / win_loss_ratio
//! clamped  = clamp(raw, 0, max_kelly_fraction)
//! applied  = clamped * fractional_kelly
//! ```
//!
//! # Example
//! - Win rate 0.6, win/loss ratio 2.0: raw = 0.6 - 0.4 / 2.0 = 0.40
//! - Half-Kelly: applied = 0.20

use serde::{Deserialize, Serialize};

use super::SizingError;

/// Historical edge used by the Kelly overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyInputs {
    /// Fraction of winning trades, in `[0, 1]`.
    pub win_rate: f64,
    /// Average win / average loss, `> 0`.
    pub win_loss_ratio: f64,
}

/// The three stages of the Kelly computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyFraction {
    pub raw: f64,
    pub clamped: f64,
    pub applied: f64,
}

/// Compute the Kelly fraction of capital to risk.
pub fn kelly_fraction(
    inputs: &KellyInputs,
    max_kelly_fraction: f64,
    fractional_kelly: f64,
) -> Result<KellyFraction, SizingError> {
    let KellyInputs {
        win_rate,
        win_loss_ratio,
    } = *inputs;
    if !(0.0..=1.0).contains(&win_rate) {
        return Err(SizingError::InvalidKellyInputs(format!(
            "win_rate must be in [0, 1], got {win_rate}"
        )));
    }
    if !(win_loss_ratio.is_finite() && win_loss_ratio > 0.0) {
        return Err(SizingError::InvalidKellyInputs(format!(
            "win_loss_ratio must be > 0, got {win_loss_ratio}"
        )));
    }

    let raw = win_rate - (1.0 - win_rate) / win_loss_ratio;
    let clamped = raw.clamp(0.0, max_kelly_fraction.max(0.0));
    Ok(KellyFraction {
        raw,
        clamped,
        applied: clamped * fractional_kelly,
    })
}
