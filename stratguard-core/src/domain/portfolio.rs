//! Portfolio snapshot — read-only view supplied by the portfolio-tracking caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One open holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed quantity; negative for shorts.
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: f64, entry_price: f64, current_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            entry_price,
            current_price,
            stop_loss: None,
        }
    }

    /// Signed market value at the current price.
    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }

    /// Market value at an arbitrary price.
    pub fn value_at(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.quantity * (self.current_price - self.entry_price)
    }
}

/// Cash plus open positions keyed by symbol.
///
/// `total_value` is caller-supplied (it may include items the engine does not
/// see); [`PortfolioSnapshot::from_positions`] derives it as
/// `cash + sum(market values)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    #[serde(default)]
    pub positions: BTreeMap<String, Position>,
    pub total_value: f64,
}

impl PortfolioSnapshot {
    /// Build a snapshot whose total value is `cash + sum(market values)`.
    pub fn from_positions(cash: f64, positions: impl IntoIterator<Item = Position>) -> Self {
        let positions: BTreeMap<String, Position> = positions
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();
        let invested: f64 = positions.values().map(Position::market_value).sum();
        Self {
            cash,
            positions,
            total_value: cash + invested,
        }
    }

    /// Sum of position market values.
    pub fn invested_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.get(symbol).is_some_and(|p| p.quantity != 0.0)
    }

    /// Position weight = |market value| / total value, per symbol.
    ///
    /// Empty when the total value is not positive.
    pub fn weights(&self) -> BTreeMap<String, f64> {
        if self.total_value <= 0.0 {
            return BTreeMap::new();
        }
        self.positions
            .iter()
            .map(|(sym, p)| (sym.clone(), p.market_value().abs() / self.total_value))
            .collect()
    }
}
