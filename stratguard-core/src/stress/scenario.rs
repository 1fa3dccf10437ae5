//! Stress scenarios and the default scenario set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A deterministic price shock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    /// Uniform price change as a fraction (-0.20 = a 20% drop).
    pub price_shock: f64,
    /// Multiplier on historical volatility for the scenario's VaR/CVaR.
    pub volatility_multiplier: f64,
    /// Per-symbol overrides of `price_shock`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub symbol_shocks: BTreeMap<String, f64>,
}

impl StressScenario {
    pub fn new(name: impl Into<String>, price_shock: f64, volatility_multiplier: f64) -> Self {
        Self {
            name: name.into(),
            price_shock,
            volatility_multiplier,
            symbol_shocks: BTreeMap::new(),
        }
    }

    pub fn with_symbol_shock(mut self, symbol: impl Into<String>, shock: f64) -> Self {
        self.symbol_shocks.insert(symbol.into(), shock);
        self
    }

    /// Shock applied to `symbol`.
    pub fn shock_for(&self, symbol: &str) -> f64 {
        self.symbol_shocks
            .get(symbol)
            .copied()
            .unwrap_or(self.price_shock)
    }
}

/// The documented default set:
///
/// | Scenario | Shock | Volatility |
/// |---|---|---|
/// | Market Crash | −20% | 3.0× |
/// | Flash Crash | −10% | 5.0× |
/// | Moderate Correction | −10% | 1.5× |
/// | Volatility Spike | −5% | 4.0× |
/// | Black Swan | −30% | 10.0× |
pub fn default_scenarios() -> Vec<StressScenario> {
    vec![
        StressScenario::new("Market Crash", -0.20, 3.0),
        StressScenario::new("Flash Crash", -0.10, 5.0),
        StressScenario::new("Moderate Correction", -0.10, 1.5),
        StressScenario::new("Volatility Spike", -0.05, 4.0),
        StressScenario::new("Black Swan", -0.30, 10.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_is_documented_five() {
        let set = default_scenarios();
        assert_eq!(set.len(), 5);
        assert_eq!(set[0].name, "Market Crash");
        assert_eq!(set[0].price_shock, -0.20);
        assert_eq!(set[4].volatility_multiplier, 10.0);
    }

    #[test]
    fn symbol_override() {
        let s = StressScenario::new("Tech", -0.05, 2.0).with_symbol_shock("NVDA", -0.25);
        assert_eq!(s.shock_for("NVDA"), -0.25);
        assert_eq!(s.shock_for("XOM"), -0.05);
    }
}
