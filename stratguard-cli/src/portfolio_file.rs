//! Portfolio file for the `stress-test` command.
//!
//! TOML (or JSON, by extension) holding the snapshot, optional price
//! histories and optional engine settings:
//!
//! ```toml
//! cash = 25000.0
//!
//! [[positions]]
//! symbol = "AAPL"
//! quantity = 100
//! entry_price = 140.0
//! current_price = 150.0
//!
//! [prices]
//! AAPL = [140.0, 142.5, 141.0, 150.0]
//!
//! [stress]
//! fallback_volatility = 0.03
//!
//! [monte_carlo]
//! num_simulations = 5000
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use stratguard_core::correlation::CorrelationConfig;
use stratguard_core::domain::{PortfolioSnapshot, Position};
use stratguard_core::stress::{MonteCarloConfig, StressConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioFile {
    pub cash: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
    /// Overrides `cash + market value` when the caller tracks more than the
    /// listed holdings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<f64>,
    /// Price history per symbol, oldest first.
    #[serde(default)]
    pub prices: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub stress: StressConfig,
    #[serde(default)]
    pub monte_carlo: MonteCarloConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
}

impl PortfolioFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read portfolio file {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let file: Self = if is_json {
            serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))?
        } else {
            toml::from_str(&content).with_context(|| format!("parse {}", path.display()))?
        };
        file.check()?;
        Ok(file)
    }

    fn check(&self) -> Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for p in &self.positions {
            if !seen.insert(p.symbol.as_str()) {
                bail!("position '{}' is listed twice", p.symbol);
            }
            if !(p.current_price.is_finite() && p.current_price > 0.0) {
                bail!("position '{}' has invalid current price {}", p.symbol, p.current_price);
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        let mut snapshot = PortfolioSnapshot::from_positions(self.cash, self.positions.iter().cloned());
        if let Some(total) = self.total_value {
            snapshot.total_value = total;
        }
        snapshot
    }
}
