//! Statistical significance of strategy returns against a benchmark (or zero).
//!
//! Cohen's d measures the effect size; a one-sided t-test on the excess
//! returns gives the p-value. An implausibly large effect is treated as a
//! warning sign of its own.

use serde::{Deserialize, Serialize};

use stratguard_core::stats::{mean, one_sided_t_test, variance};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignificanceTest {
    pub effect_size: f64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub observations: usize,
    /// Fewer than two return observations.
    pub skipped: bool,
}

/// Test `strategy` against `benchmark` (tail-aligned) or against zero.
pub fn significance(strategy: &[f64], benchmark: Option<&[f64]>) -> SignificanceTest {
    let (strategy, benchmark) = match benchmark {
        Some(b) => {
            let n = strategy.len().min(b.len());
            (&strategy[strategy.len() - n..], Some(&b[b.len() - n..]))
        }
        None => (strategy, None),
    };

    let excess: Vec<f64> = match benchmark {
        Some(b) => strategy.iter().zip(b).map(|(s, b)| s - b).collect(),
        None => strategy.to_vec(),
    };
    let Some(t) = one_sided_t_test(&excess) else {
        return SignificanceTest {
            effect_size: 0.0,
            t_statistic: 0.0,
            p_value: 1.0,
            observations: excess.len(),
            skipped: true,
        };
    };

    let effect_size = match benchmark {
        Some(b) => cohens_d(mean(strategy) - mean(b), ((variance(strategy) + variance(b)) / 2.0).sqrt()),
        None => cohens_d(mean(strategy), variance(strategy).sqrt()),
    };

    SignificanceTest {
        effect_size,
        t_statistic: t.t_statistic,
        p_value: t.p_value,
        observations: excess.len(),
        skipped: false,
    }
}

/// Zero spread: 0 for a zero difference, otherwise an infinite effect.
fn cohens_d(diff: f64, spread: f64) -> f64 {
    if spread > 1e-15 {
        diff / spread
    } else if diff == 0.0 {
        0.0
    } else {
        f64::INFINITY.copysign(diff)
    }
}

/// Risk contribution in `[0, 1]`: grows with the p-value (1 at `p >= 0.5`),
/// and is 1 for an implausible effect size.
pub fn significance_risk(test: &SignificanceTest, max_plausible_effect_size: f64) -> f64 {
    if test.skipped {
        return 0.0;
    }
    if test.effect_size.abs() > max_plausible_effect_size {
        return 1.0;
    }
    (test.p_value * 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_positive_returns_are_significant() {
        let returns: Vec<f64> = (0..60).map(|i| 0.01 + if i % 2 == 0 { 0.005 } else { -0.005 }).collect();
        let t = significance(&returns, None);
        assert!(!t.skipped);
        assert!(t.p_value < 0.01);
        assert!(t.effect_size > 1.0);
    }

    #[test]
    fn benchmark_removes_shared_drift() {
        let bench: Vec<f64> = (0..60).map(|i| 0.01 + if i % 3 == 0 { 0.004 } else { -0.002 }).collect();
        let strat: Vec<f64> = bench.iter().enumerate().map(|(i, b)| b + if i % 2 == 0 { 0.001 } else { -0.001 }).collect();
        let t = significance(&strat, Some(&bench));
        assert!(t.p_value > 0.05, "p {}", t.p_value);
        assert!(t.effect_size.abs() < 0.5);
    }

    #[test]
    fn benchmark_is_tail_aligned() {
        let strat = [0.01, 0.02, 0.01, 0.03];
        let bench = [0.5, 0.5, 0.0, 0.0, 0.0, 0.0];
        let t = significance(&strat, Some(&bench));
        assert_eq!(t.observations, 4);
    }

    #[test]
    fn single_observation_is_skipped() {
        let t = significance(&[0.05], None);
        assert!(t.skipped);
        assert_eq!(t.p_value, 1.0);
        assert_eq!(significance_risk(&t, 3.0), 0.0);
    }

    #[test]
    fn implausible_effect_is_full_risk() {
        let t = significance(&[0.01; 30], None);
        assert!(t.effect_size.is_infinite());
        assert_eq!(significance_risk(&t, 3.0), 1.0);
    }
}
