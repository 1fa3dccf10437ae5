//! Inverse-volatility (naive risk parity) weights.

use std::collections::BTreeMap;

/// Weights proportional to `1 / volatility`, summing to 1.
///
/// Symbols with zero, negative or non-finite volatility are excluded (their
/// risk contribution is undefined). Empty when nothing qualifies.
pub fn risk_parity_weights(volatilities: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let inverse: BTreeMap<String, f64> = volatilities
        .iter()
        .filter(|(_, &v)| v.is_finite() && v > 0.0)
        .map(|(s, &v)| (s.clone(), 1.0 / v))
        .collect();
    let total: f64 = inverse.values().sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    inverse.into_iter().map(|(s, w)| (s, w / total)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_vol_gets_more_weight() {
        let vols = BTreeMap::from([("A".to_string(), 0.10), ("B".to_string(), 0.20)]);
        let w = risk_parity_weights(&vols);
        assert!((w["A"] - 2.0 / 3.0).abs() < 1e-12);
        assert!((w["B"] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_volatilities_excluded() {
        let vols = BTreeMap::from([
            ("A".to_string(), 0.0),
            ("B".to_string(), f64::NAN),
            ("C".to_string(), 0.3),
        ]);
        let w = risk_parity_weights(&vols);
        assert_eq!(w.len(), 1);
        assert!((w["C"] - 1.0).abs() < 1e-12);
        assert!(risk_parity_weights(&BTreeMap::new()).is_empty());
    }
}
