//! Position sizing — turn a risk budget into a trade quantity.
//!
//! The sizer runs a fixed pipeline; each stage multiplies or blends the
//! running size and is recorded in [`SizingResult::applied_adjustments`]:
//! 1. risk amount = `risk_per_trade × total_value`, capped at `max_risk`
//! 2. raw size = risk amount / |entry − stop|
//! 3. volatility scale `2·baseline / (baseline + vol)`
//! 4. correlation penalty `1 − correlation_penalty × avg positive correlation`
//! 5. Kelly overlay, blended with the adjusted size
//! 6. confidence scale `confidence / 100`
//! 7. unit and portfolio-percentage caps

pub mod kelly;
pub mod risk_parity;

pub use kelly::{kelly_fraction, KellyFraction, KellyInputs};
pub use risk_parity::risk_parity_weights;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::PortfolioSnapshot;
use crate::error::ErrorKind;
use crate::stats::{log_returns, std_dev};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Fraction of portfolio value risked per trade (default 0.02 = 2%).
    pub risk_per_trade: f64,
    /// Absolute cap on the risk amount in account currency (default 2,000).
    pub max_risk: f64,
    /// Maximum position size in units (default 10,000).
    pub max_position_size: f64,
    /// Maximum position value as a fraction of portfolio value (default 0.25).
    pub max_position_percent: f64,
    /// Scale size inversely to realized volatility (default true).
    pub volatility_adjustment: bool,
    /// Per-period volatility at which the volatility scale is 1.0 (default 0.02).
    pub baseline_volatility: f64,
    /// Number of recent returns used for realized volatility (default 20).
    pub volatility_lookback: usize,
    /// Reduce size by average positive correlation with holdings (default true).
    pub correlation_adjustment: bool,
    /// Size reduction per unit of average correlation (default 0.5).
    pub correlation_penalty: f64,
    /// Upper clamp on the raw Kelly fraction (default 0.5).
    pub max_kelly_fraction: f64,
    /// Multiplier on the clamped Kelly fraction (default 0.5 = half-Kelly).
    pub fractional_kelly: f64,
    /// Weight of the Kelly size in the final blend, in `[0, 1)` so the
    /// volatility-adjusted size always contributes (default 0.5).
    pub kelly_blend: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.02,
            max_risk: 2_000.0,
            max_position_size: 10_000.0,
            max_position_percent: 0.25,
            volatility_adjustment: true,
            baseline_volatility: 0.02,
            volatility_lookback: 20,
            correlation_adjustment: true,
            correlation_penalty: 0.5,
            max_kelly_fraction: 0.5,
            fractional_kelly: 0.5,
            kelly_blend: 0.5,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), SizingError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(SizingError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {v}"
                )))
            }
        };
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SizingError::InvalidConfig(format!(
                    "{name} must be > 0, got {v}"
                )))
            }
        };
        unit("risk_per_trade", self.risk_per_trade)?;
        unit("max_position_percent", self.max_position_percent)?;
        unit("correlation_penalty", self.correlation_penalty)?;
        unit("max_kelly_fraction", self.max_kelly_fraction)?;
        unit("fractional_kelly", self.fractional_kelly)?;
        if !(0.0..1.0).contains(&self.kelly_blend) {
            return Err(SizingError::InvalidConfig(format!(
                "kelly_blend must be in [0, 1), got {}",
                self.kelly_blend
            )));
        }
        positive("max_risk", self.max_risk)?;
        positive("max_position_size", self.max_position_size)?;
        positive("baseline_volatility", self.baseline_volatility)?;
        if self.volatility_lookback < 2 {
            return Err(SizingError::InvalidConfig(
                "volatility_lookback must be >= 2".into(),
            ));
        }
        Ok(())
    }
}

// ─── Request / result ────────────────────────────────────────────────

/// Market context for the symbol being sized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketData {
    /// Recent closes, oldest first. Used for realized volatility when
    /// `volatility` is not given.
    pub prices: Vec<f64>,
    /// Explicit per-period volatility; overrides `prices`.
    pub volatility: Option<f64>,
    /// Correlation of the symbol with other symbols (typically from the
    /// correlation manager). Only held symbols are considered.
    pub correlations: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingRequest {
    pub symbol: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    #[serde(default)]
    pub market_data: MarketData,
    /// Signal confidence in `[0, 100]`.
    pub confidence: f64,
    #[serde(default)]
    pub kelly: Option<KellyInputs>,
}

/// Pipeline stage that changed the size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingStage {
    Volatility,
    Correlation,
    Kelly,
    Confidence,
    MaxPositionSize,
    MaxPositionPercent,
}

/// One recorded pipeline adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingAdjustment {
    pub stage: SizingStage,
    /// Multiplicative effect on the running size.
    pub factor: f64,
    pub size_after: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    pub symbol: String,
    /// Final quantity in units, `>= 0`.
    pub recommended_size: f64,
    /// Risk budget for the trade, `<= max_risk`.
    pub risk_amount: f64,
    /// Loss if the stop is hit at the recommended size.
    pub effective_risk: f64,
    /// |entry − stop|.
    pub stop_distance: f64,
    /// Size before any adjustment.
    pub raw_size: f64,
    /// Realized volatility used by the volatility stage, if any.
    pub volatility: Option<f64>,
    pub kelly: Option<KellyFraction>,
    pub applied_adjustments: Vec<SizingAdjustment>,
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("stop loss {stop_loss} equals entry price {entry_price}")]
    InvalidStopLoss { entry_price: f64, stop_loss: f64 },
    #[error("invalid price: {0}")]
    InvalidPrice(f64),
    #[error("portfolio value must be positive, got {0}")]
    NonPositivePortfolio(f64),
    #[error("confidence must be in [0, 100], got {0}")]
    InvalidConfidence(f64),
    #[error("invalid Kelly inputs: {0}")]
    InvalidKellyInputs(String),
    #[error("invalid sizing configuration: {0}")]
    InvalidConfig(String),
}

impl SizingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SizingError::InvalidStopLoss { .. }
            | SizingError::InvalidPrice(_)
            | SizingError::NonPositivePortfolio(_) => ErrorKind::DegenerateInput,
            SizingError::InvalidConfidence(_)
            | SizingError::InvalidKellyInputs(_)
            | SizingError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

// ─── Sizer ───────────────────────────────────────────────────────────

/// Risk-budget position sizer.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Result<Self, SizingError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Size a trade against the current portfolio.
    pub fn size(
        &self,
        request: &SizingRequest,
        portfolio: &PortfolioSnapshot,
    ) -> Result<SizingResult, SizingError> {
        let cfg = &self.config;
        let entry = request.entry_price;
        if !(entry.is_finite() && entry > 0.0) {
            return Err(SizingError::InvalidPrice(entry));
        }
        if !request.stop_loss.is_finite() {
            return Err(SizingError::InvalidPrice(request.stop_loss));
        }
        if !(portfolio.total_value.is_finite() && portfolio.total_value > 0.0) {
            return Err(SizingError::NonPositivePortfolio(portfolio.total_value));
        }
        if !(0.0..=100.0).contains(&request.confidence) {
            return Err(SizingError::InvalidConfidence(request.confidence));
        }
        let stop_distance = (entry - request.stop_loss).abs();
        if stop_distance < f64::EPSILON * entry {
            return Err(SizingError::InvalidStopLoss {
                entry_price: entry,
                stop_loss: request.stop_loss,
            });
        }

        let risk_amount = (cfg.risk_per_trade * portfolio.total_value).min(cfg.max_risk);
        let raw_size = risk_amount / stop_distance;
        let mut size = raw_size;
        let mut adjustments = Vec::new();
        let mut record = |stage, factor, size_after, note: String| {
            adjustments.push(SizingAdjustment {
                stage,
                factor,
                size_after,
                note,
            })
        };

        // 3. Volatility
        let mut volatility = None;
        if cfg.volatility_adjustment {
            if let Some(vol) = self.realized_volatility(&request.market_data) {
                let factor = volatility_scale(cfg.baseline_volatility, vol);
                size *= factor;
                volatility = Some(vol);
                record(
                    SizingStage::Volatility,
                    factor,
                    size,
                    format!("volatility {vol:.4} vs baseline {:.4}", cfg.baseline_volatility),
                );
            }
        }

        // 4. Correlation
        if cfg.correlation_adjustment {
            if let Some(avg) = average_positive_correlation(request, portfolio) {
                let factor = (1.0 - cfg.correlation_penalty * avg).max(0.0);
                size *= factor;
                record(
                    SizingStage::Correlation,
                    factor,
                    size,
                    format!("average positive correlation with holdings {avg:.2}"),
                );
            }
        }

        // 5. Kelly
        let kelly = match &request.kelly {
            Some(inputs) => {
                let k = kelly_fraction(inputs, cfg.max_kelly_fraction, cfg.fractional_kelly)?;
                let kelly_size = k.applied * portfolio.total_value / entry;
                let blended = (1.0 - cfg.kelly_blend) * size + cfg.kelly_blend * kelly_size;
                let factor = if size > 0.0 { blended / size } else { 1.0 };
                size = blended;
                record(
                    SizingStage::Kelly,
                    factor,
                    size,
                    format!("kelly fraction {:.3} (raw {:.3})", k.applied, k.raw),
                );
                Some(k)
            }
            None => None,
        };

        // 6. Confidence
        let factor = request.confidence / 100.0;
        size *= factor;
        record(
            SizingStage::Confidence,
            factor,
            size,
            format!("confidence {:.0}%", request.confidence),
        );

        // 7. Caps
        if size > cfg.max_position_size {
            let factor = cfg.max_position_size / size;
            size = cfg.max_position_size;
            record(
                SizingStage::MaxPositionSize,
                factor,
                size,
                format!("capped at {} units", cfg.max_position_size),
            );
        }
        let percent_cap = cfg.max_position_percent * portfolio.total_value / entry;
        if size > percent_cap {
            let factor = percent_cap / size;
            size = percent_cap;
            record(
                SizingStage::MaxPositionPercent,
                factor,
                size,
                format!(
                    "capped at {:.0}% of portfolio value",
                    cfg.max_position_percent * 100.0
                ),
            );
        }

        let recommended_size = size.max(0.0);
        debug!(
            symbol = %request.symbol,
            raw_size,
            recommended_size,
            "position sized"
        );

        Ok(SizingResult {
            symbol: request.symbol.clone(),
            recommended_size,
            risk_amount,
            effective_risk: recommended_size * stop_distance,
            stop_distance,
            raw_size,
            volatility,
            kelly,
            applied_adjustments: adjustments,
        })
    }

    /// Explicit volatility, else the sample stdev of the last
    /// `volatility_lookback` log returns. `None` when neither is usable.
    fn realized_volatility(&self, data: &MarketData) -> Option<f64> {
        if let Some(v) = data.volatility {
            return (v.is_finite() && v >= 0.0).then_some(v);
        }
        let returns = log_returns(&data.prices);
        if returns.len() < 2 {
            return None;
        }
        let start = returns.len().saturating_sub(self.config.volatility_lookback);
        Some(std_dev(&returns[start..]))
    }
}

/// `2·baseline / (baseline + vol)`: 1.0 at the baseline, 2.0 at zero
/// volatility, strictly decreasing in `vol`.
pub fn volatility_scale(baseline: f64, vol: f64) -> f64 {
    2.0 * baseline / (baseline + vol.max(0.0))
}

/// Mean of `max(correlation, 0)` over held symbols other than the one sized.
fn average_positive_correlation(
    request: &SizingRequest,
    portfolio: &PortfolioSnapshot,
) -> Option<f64> {
    let held: Vec<f64> = request
        .market_data
        .correlations
        .iter()
        .filter(|(sym, c)| {
            **sym != request.symbol && portfolio.has_position(sym) && c.is_finite()
        })
        .map(|(_, c)| c.max(0.0))
        .collect();
    if held.is_empty() {
        None
    } else {
        Some(held.iter().sum::<f64>() / held.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;

    fn portfolio() -> PortfolioSnapshot {
        PortfolioSnapshot::from_positions(100_000.0, [])
    }

    fn request(vol: Option<f64>) -> SizingRequest {
        SizingRequest {
            symbol: "AAPL".into(),
            entry_price: 100.0,
            stop_loss: 95.0,
            market_data: MarketData {
                volatility: vol,
                ..MarketData::default()
            },
            confidence: 100.0,
            kelly: None,
        }
    }

    fn plain() -> PositionSizer {
        PositionSizer::new(SizingConfig {
            volatility_adjustment: false,
            correlation_adjustment: false,
            ..SizingConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn raw_size_from_risk_budget() {
        let r = plain().size(&request(None), &portfolio()).unwrap();
        // risk = min(2% * 100k, 2000) = 2000; size = 2000 / 5 = 400
        assert_eq!(r.risk_amount, 2_000.0);
        assert_eq!(r.raw_size, 400.0);
        assert_eq!(r.recommended_size, 250.0); // 25% of 100k / 100
        assert_eq!(
            r.applied_adjustments.last().map(|a| a.stage),
            Some(SizingStage::MaxPositionPercent)
        );
    }

    #[test]
    fn risk_amount_capped_at_max_risk() {
        let p = PortfolioSnapshot::from_positions(1_000_000.0, []);
        let r = plain().size(&request(None), &p).unwrap();
        assert_eq!(r.risk_amount, 2_000.0);
    }

    #[test]
    fn equal_stop_is_degenerate() {
        let mut req = request(None);
        req.stop_loss = req.entry_price;
        let err = plain().size(&req, &portfolio()).unwrap_err();
        assert!(matches!(err, SizingError::InvalidStopLoss { .. }));
        assert_eq!(err.kind(), ErrorKind::DegenerateInput);
    }

    #[test]
    fn non_positive_entry_rejected() {
        let mut req = request(None);
        req.entry_price = 0.0;
        assert_eq!(
            plain().size(&req, &portfolio()).unwrap_err(),
            SizingError::InvalidPrice(0.0)
        );
    }

    #[test]
    fn confidence_scales_linearly() {
        let sizer = PositionSizer::new(SizingConfig {
            volatility_adjustment: false,
            correlation_adjustment: false,
            max_position_percent: 1.0,
            ..SizingConfig::default()
        })
        .unwrap();
        let mut req = request(None);
        req.confidence = 50.0;
        let r = sizer.size(&req, &portfolio()).unwrap();
        assert!((r.recommended_size - 200.0).abs() < 1e-9);
        req.confidence = 0.0;
        assert_eq!(sizer.size(&req, &portfolio()).unwrap().recommended_size, 0.0);
        req.confidence = 101.0;
        assert!(sizer.size(&req, &portfolio()).is_err());
    }

    #[test]
    fn volatility_scale_shape() {
        assert!((volatility_scale(0.02, 0.02) - 1.0).abs() < 1e-12);
        assert!((volatility_scale(0.02, 0.0) - 2.0).abs() < 1e-12);
        assert!(volatility_scale(0.02, 0.04) < volatility_scale(0.02, 0.03));
    }

    #[test]
    fn higher_volatility_smaller_size() {
        let sizer = PositionSizer::new(SizingConfig {
            correlation_adjustment: false,
            max_position_percent: 1.0,
            max_position_size: 1e12,
            ..SizingConfig::default()
        })
        .unwrap();
        let low = sizer.size(&request(Some(0.01)), &portfolio()).unwrap();
        let high = sizer.size(&request(Some(0.05)), &portfolio()).unwrap();
        assert!(high.recommended_size < low.recommended_size);
        assert_eq!(high.volatility, Some(0.05));
    }

    #[test]
    fn volatility_from_prices() {
        let sizer = PositionSizer::new(SizingConfig::default()).unwrap();
        let data = MarketData {
            prices: vec![100.0, 101.0, 99.0, 102.0, 100.0],
            ..MarketData::default()
        };
        let vol = sizer.realized_volatility(&data).unwrap();
        assert!(vol > 0.0);
        assert!(sizer.realized_volatility(&MarketData::default()).is_none());
    }

    #[test]
    fn correlation_penalty_only_for_held_symbols() {
        let sizer = PositionSizer::new(SizingConfig {
            volatility_adjustment: false,
            max_position_percent: 1.0,
            ..SizingConfig::default()
        })
        .unwrap();
        let p = PortfolioSnapshot::from_positions(
            90_000.0,
            [Position::new("MSFT", 100.0, 100.0, 100.0)],
        );
        let mut req = request(None);
        req.market_data.correlations =
            BTreeMap::from([("MSFT".to_string(), 0.8), ("GOOG".to_string(), 0.9)]);
        let r = sizer.size(&req, &p).unwrap();
        // factor = 1 - 0.5 * 0.8 = 0.6
        assert!((r.recommended_size - 400.0 * 0.6).abs() < 1e-9);

        req.market_data.correlations = BTreeMap::from([("MSFT".to_string(), -0.7)]);
        let r = sizer.size(&req, &p).unwrap();
        assert!((r.recommended_size - 400.0).abs() < 1e-9);
    }

    #[test]
    fn kelly_blends_with_adjusted_size() {
        let sizer = PositionSizer::new(SizingConfig {
            volatility_adjustment: false,
            correlation_adjustment: false,
            max_position_percent: 1.0,
            ..SizingConfig::default()
        })
        .unwrap();
        let mut req = request(None);
        req.kelly = Some(KellyInputs {
            win_rate: 0.6,
            win_loss_ratio: 2.0,
        });
        let r = sizer.size(&req, &portfolio()).unwrap();
        let k = r.kelly.unwrap();
        assert!((k.raw - 0.40).abs() < 1e-12);
        assert!((k.applied - 0.20).abs() < 1e-12);
        // kelly size = 0.2 * 100k / 100 = 200; blend 0.5 → (400 + 200) / 2
        assert!((r.recommended_size - 300.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_config_rejected() {
        let err = PositionSizer::new(SizingConfig {
            risk_per_trade: 1.5,
            ..SizingConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn full_kelly_blend_rejected() {
        let err = PositionSizer::new(SizingConfig {
            kelly_blend: 1.0,
            ..SizingConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("kelly_blend"));
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn near_full_kelly_blend_still_shrinks_with_volatility() {
        let sizer = PositionSizer::new(SizingConfig {
            correlation_adjustment: false,
            max_position_percent: 1.0,
            max_position_size: 1e12,
            kelly_blend: 0.99,
            ..SizingConfig::default()
        })
        .unwrap();
        let with_kelly = |vol| {
            let mut req = request(Some(vol));
            req.kelly = Some(KellyInputs {
                win_rate: 0.6,
                win_loss_ratio: 2.0,
            });
            sizer.size(&req, &portfolio()).unwrap().recommended_size
        };
        assert!(with_kelly(0.05) < with_kelly(0.01));
    }
}
