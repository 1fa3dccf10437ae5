//! Overfitting detection — is the chosen parameter set genuinely good, or
//! tuned to noise in the training window?
//!
//! Four sub-tests each produce a pass/fail and a risk contribution in `[0, 1]`:
//! - `degradation`: relative drop from train to test score
//! - `sensitivity`: score change under small parameter perturbations
//! - `white_noise`: Ljung–Box on out-of-sample score residuals
//! - `significance`: effect size and t-test of strategy returns vs. benchmark
//!
//! The composite overfitting score is the weighted sum of the risks
//! (0.40 / 0.25 / 0.15 / 0.20). A report passes when every sub-test passes
//! and the composite stays below `max_overfitting_score`.

pub mod degradation;
pub mod sensitivity;
pub mod significance;
pub mod white_noise;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use stratguard_core::domain::{Objective, ParameterSet, ParameterSpace};
use stratguard_core::error::ErrorKind;

pub use degradation::Severity;
use degradation::{degradation_pct, degradation_risk, degradation_severity};
use sensitivity::{sensitivity_risk, ParameterSensitivity};
use significance::{significance, significance_risk};
use white_noise::{ljung_box, white_noise_risk};

const DEGRADATION_WEIGHT: f64 = 0.40;
const SENSITIVITY_WEIGHT: f64 = 0.25;
const WHITE_NOISE_WEIGHT: f64 = 0.15;
const SIGNIFICANCE_WEIGHT: f64 = 0.20;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverfittingConfig {
    /// Degradation at or above this fails (default 0.20).
    pub max_degradation: f64,
    /// Mean parameter sensitivity at or above this fails (default 0.15).
    pub max_sensitivity: f64,
    /// Parameters above this sensitivity are flagged unstable (default 0.25).
    pub unstable_threshold: f64,
    /// Relative perturbations applied to each numeric parameter
    /// (default ±5%, ±10%).
    pub perturbations: Vec<f64>,
    /// White-noise test passes when `p > alpha` (default 0.05).
    pub white_noise_alpha: f64,
    /// Upper bound on Ljung–Box lags (default 10).
    pub max_lags: usize,
    /// Fewer residuals than this skip the white-noise test (default 8).
    pub min_residuals: usize,
    /// Significance passes when `p < 1 − confidence_level` (default 0.95).
    pub confidence_level: f64,
    /// Larger |Cohen's d| is treated as implausible (default 3.0).
    pub max_plausible_effect_size: f64,
    /// Composite score must stay below this to pass (default 0.5).
    pub max_overfitting_score: f64,
}

impl Default for OverfittingConfig {
    fn default() -> Self {
        Self {
            max_degradation: 0.20,
            max_sensitivity: 0.15,
            unstable_threshold: 0.25,
            perturbations: vec![-0.10, -0.05, 0.05, 0.10],
            white_noise_alpha: 0.05,
            max_lags: 10,
            min_residuals: 8,
            confidence_level: 0.95,
            max_plausible_effect_size: 3.0,
            max_overfitting_score: 0.5,
        }
    }
}

impl OverfittingConfig {
    pub fn validate(&self) -> Result<(), OverfittingError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(OverfittingError::InvalidConfig(format!("{name} must be > 0, got {v}")))
            }
        };
        positive("max_degradation", self.max_degradation)?;
        positive("max_sensitivity", self.max_sensitivity)?;
        positive("unstable_threshold", self.unstable_threshold)?;
        positive("max_plausible_effect_size", self.max_plausible_effect_size)?;
        if !(0.0 < self.white_noise_alpha && self.white_noise_alpha < 1.0) {
            return Err(OverfittingError::InvalidConfig("white_noise_alpha must be in (0, 1)".into()));
        }
        if !(0.0 < self.confidence_level && self.confidence_level < 1.0) {
            return Err(OverfittingError::InvalidConfig("confidence_level must be in (0, 1)".into()));
        }
        if !(0.0..=1.0).contains(&self.max_overfitting_score) {
            return Err(OverfittingError::InvalidConfig("max_overfitting_score must be in [0, 1]".into()));
        }
        if self.perturbations.iter().any(|p| !p.is_finite() || *p == 0.0) {
            return Err(OverfittingError::InvalidConfig("perturbations must be finite and non-zero".into()));
        }
        if self.max_lags == 0 {
            return Err(OverfittingError::InvalidConfig("max_lags must be > 0".into()));
        }
        Ok(())
    }
}

// ─── Input / report ──────────────────────────────────────────────────

/// Everything the detector looks at for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub train_score: f64,
    pub validation_score: f64,
    pub test_score: f64,
    pub parameters: &'a ParameterSet,
    pub space: &'a ParameterSpace,
    /// Out-of-sample score history used as residuals for the white-noise test.
    pub oos_scores: &'a [f64],
    pub strategy_returns: &'a [f64],
    pub benchmark_returns: Option<&'a [f64]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    /// Contribution to the composite score before weighting, in `[0, 1]`.
    pub risk: f64,
    /// Not enough data to run; counts as passed with zero risk.
    pub skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubTests {
    pub degradation: TestOutcome,
    pub sensitivity: TestOutcome,
    pub white_noise: TestOutcome,
    pub significance: TestOutcome,
}

impl SubTests {
    pub fn all_passed(&self) -> bool {
        self.degradation.passed && self.sensitivity.passed && self.white_noise.passed && self.significance.passed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverfittingReport {
    pub degradation_pct: f64,
    pub degradation_severity: Severity,
    /// Train → validation drop; informational.
    pub validation_degradation_pct: f64,
    pub sensitivity_score: f64,
    pub parameter_sensitivities: Vec<ParameterSensitivity>,
    pub unstable_parameters: Vec<String>,
    pub white_noise_p_value: f64,
    pub ljung_box_q: f64,
    pub effect_size: f64,
    pub significance_p_value: f64,
    /// Weighted risk in `[0, 1]`.
    pub overfitting_score: f64,
    pub severity: Severity,
    pub passed: bool,
    pub tests: SubTests,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverfittingError {
    #[error("invalid overfitting configuration: {0}")]
    InvalidConfig(String),
}

impl OverfittingError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}

// ─── Detector ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OverfittingDetector {
    config: OverfittingConfig,
}

impl OverfittingDetector {
    pub fn new(config: OverfittingConfig) -> Result<Self, OverfittingError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OverfittingConfig {
        &self.config
    }

    /// Run every sub-test. `perturb` re-scores perturbed parameter sets,
    /// normally on the same window that produced `test_score`.
    pub fn detect(&self, input: &DetectionInput<'_>, perturb: &dyn Objective) -> OverfittingReport {
        let cfg = &self.config;

        let degradation = degradation_pct(input.train_score, input.test_score);
        let degradation_test = TestOutcome {
            passed: degradation < cfg.max_degradation,
            risk: bounded_risk(degradation_risk(degradation, cfg.max_degradation)),
            skipped: false,
        };

        let sens = sensitivity::analyze(
            input.space,
            input.parameters,
            input.test_score,
            perturb,
            &cfg.perturbations,
            cfg.unstable_threshold,
        );
        let sensitivity_test = TestOutcome {
            passed: sens.score < cfg.max_sensitivity,
            risk: bounded_risk(sensitivity_risk(sens.score, cfg.max_sensitivity)),
            skipped: sens.parameters.is_empty(),
        };

        let lb = ljung_box(input.oos_scores, cfg.max_lags, cfg.min_residuals);
        let white_noise_test = TestOutcome {
            passed: lb.p_value > cfg.white_noise_alpha,
            risk: bounded_risk(white_noise_risk(lb.p_value)),
            skipped: lb.skipped,
        };

        let sig = significance(input.strategy_returns, input.benchmark_returns);
        let significance_test = TestOutcome {
            passed: sig.skipped
                || (sig.p_value < 1.0 - cfg.confidence_level
                    && sig.effect_size.abs() <= cfg.max_plausible_effect_size),
            risk: bounded_risk(significance_risk(&sig, cfg.max_plausible_effect_size)),
            skipped: sig.skipped,
        };

        let tests = SubTests {
            degradation: degradation_test,
            sensitivity: sensitivity_test,
            white_noise: white_noise_test,
            significance: significance_test,
        };
        let overfitting_score = (DEGRADATION_WEIGHT * tests.degradation.risk
            + SENSITIVITY_WEIGHT * tests.sensitivity.risk
            + WHITE_NOISE_WEIGHT * tests.white_noise.risk
            + SIGNIFICANCE_WEIGHT * tests.significance.risk)
            .clamp(0.0, 1.0);
        let passed = tests.all_passed() && overfitting_score < cfg.max_overfitting_score;

        let mut recommendations = Vec::new();
        if !tests.degradation.passed {
            recommendations.push(format!(
                "Test score is {:.1}% below train: simplify the strategy or widen the training window",
                degradation * 100.0
            ));
        }
        if !tests.sensitivity.passed {
            recommendations.push(format!(
                "Score moves {:.1}% under small parameter changes: prefer a flatter region of the space",
                sens.score * 100.0
            ));
        }
        if !sens.unstable.is_empty() {
            recommendations.push(format!("Unstable parameters: {}", sens.unstable.join(", ")));
        }
        if !tests.white_noise.passed {
            recommendations.push(format!(
                "Out-of-sample residuals are autocorrelated (Ljung-Box p = {:.3}): the edge may be regime-specific",
                lb.p_value
            ));
        }
        if lb.skipped {
            recommendations.push(format!(
                "Only {} out-of-sample scores: white-noise test skipped",
                lb.observations
            ));
        }
        if !tests.significance.passed {
            if sig.effect_size.abs() > cfg.max_plausible_effect_size {
                recommendations.push(format!(
                    "Effect size {:.2} is implausibly large: check for look-ahead bias",
                    sig.effect_size
                ));
            } else {
                recommendations.push(format!(
                    "Returns are not significant at {:.0}% confidence (p = {:.3})",
                    cfg.confidence_level * 100.0,
                    sig.p_value
                ));
            }
        }
        if sig.skipped {
            recommendations.push("Too few strategy returns: significance test skipped".to_string());
        }

        debug!(
            overfitting_score,
            degradation,
            sensitivity = sens.score,
            white_noise_p = lb.p_value,
            significance_p = sig.p_value,
            passed,
            "overfitting detection done"
        );

        OverfittingReport {
            degradation_pct: degradation,
            degradation_severity: degradation_severity(degradation),
            validation_degradation_pct: degradation_pct(input.train_score, input.validation_score),
            sensitivity_score: sens.score,
            parameter_sensitivities: sens.parameters,
            unstable_parameters: sens.unstable,
            white_noise_p_value: lb.p_value,
            ljung_box_q: lb.q_statistic,
            effect_size: sig.effect_size,
            significance_p_value: sig.p_value,
            overfitting_score,
            severity: Severity::from_score(overfitting_score),
            passed,
            tests,
            recommendations,
        }
    }
}

/// A NaN risk counts as the worst case.
fn bounded_risk(risk: f64) -> f64 {
    if risk.is_nan() {
        1.0
    } else {
        risk.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratguard_core::domain::{EvaluationError, ObjectiveResult, ParamValue, ParameterSpec};

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![ParameterSpec::continuous("lookback", 10.0, 100.0)]).unwrap()
    }

    fn params(v: f64) -> ParameterSet {
        space().from_axes(&[v])
    }

    fn flat(score: f64) -> impl Fn(&ParameterSet) -> Result<ObjectiveResult, EvaluationError> {
        move |_| Ok(ObjectiveResult::from_score(score))
    }

    fn good_returns() -> Vec<f64> {
        (0..120).map(|i| 0.004 + if i % 2 == 0 { 0.01 } else { -0.01 }).collect()
    }

    fn noise_residuals() -> Vec<f64> {
        [0.25, -0.05, -0.15, 0.05, -0.4, 0.2, -0.25, -0.3, -0.2, 0.35, 0.3, -0.1, 0.15, 0.0, 0.1, 0.1].to_vec()
    }

    #[test]
    fn robust_candidate_passes() {
        let p = params(50.0);
        let space = space();
        let returns = good_returns();
        let residuals = noise_residuals();
        let input = DetectionInput {
            train_score: 1.0,
            validation_score: 0.97,
            test_score: 0.95,
            parameters: &p,
            space: &space,
            oos_scores: &residuals,
            strategy_returns: &returns,
            benchmark_returns: None,
        };
        let report = OverfittingDetector::new(OverfittingConfig::default()).unwrap().detect(&input, &flat(0.95));
        assert!((report.degradation_pct - 0.05).abs() < 1e-12);
        assert_eq!(report.degradation_severity, Severity::Low);
        assert_eq!(report.sensitivity_score, 0.0);
        assert!(report.tests.white_noise.passed, "p {}", report.white_noise_p_value);
        assert!(report.tests.significance.passed);
        assert!(report.passed, "{:?}", report.recommendations);
        assert!(report.overfitting_score < 0.5);
    }

    #[test]
    fn heavy_degradation_fails() {
        let p = params(50.0);
        let space = space();
        let input = DetectionInput {
            train_score: 2.0,
            validation_score: 1.0,
            test_score: 0.5,
            parameters: &p,
            space: &space,
            oos_scores: &[],
            strategy_returns: &[],
            benchmark_returns: None,
        };
        let report = OverfittingDetector::new(OverfittingConfig::default()).unwrap().detect(&input, &flat(0.5));
        assert!((report.degradation_pct - 0.75).abs() < 1e-12);
        assert_eq!(report.degradation_severity, Severity::Severe);
        assert!(!report.tests.degradation.passed);
        assert!(!report.passed);
        assert!(report.tests.white_noise.skipped && report.tests.significance.skipped);
        assert!(report.recommendations.iter().any(|r| r.contains("below train")));
    }

    #[test]
    fn knife_edge_parameters_fail_sensitivity() {
        let p = params(50.0);
        let space = space();
        let peaked = |q: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            let v = q.number("lookback").unwrap_or(0.0);
            Ok(ObjectiveResult::from_score(if (v - 50.0).abs() < 1e-9 { 1.0 } else { 0.2 }))
        };
        let input = DetectionInput {
            train_score: 1.0,
            validation_score: 1.0,
            test_score: 1.0,
            parameters: &p,
            space: &space,
            oos_scores: &[],
            strategy_returns: &[],
            benchmark_returns: None,
        };
        let report = OverfittingDetector::new(OverfittingConfig::default()).unwrap().detect(&input, &peaked);
        assert!((report.sensitivity_score - 0.8).abs() < 1e-9);
        assert_eq!(report.unstable_parameters, vec!["lookback".to_string()]);
        assert!(!report.passed);
    }

    #[test]
    fn categorical_only_space_skips_sensitivity() {
        let space = ParameterSpace::new(vec![ParameterSpec::categorical("mode", ["a", "b"])]).unwrap();
        let p = space
            .make_set([("mode".to_string(), ParamValue::Choice("a".into()))].into_iter().collect())
            .unwrap();
        let input = DetectionInput {
            train_score: 1.0,
            validation_score: 1.0,
            test_score: 1.0,
            parameters: &p,
            space: &space,
            oos_scores: &[],
            strategy_returns: &[],
            benchmark_returns: None,
        };
        let report = OverfittingDetector::new(OverfittingConfig::default()).unwrap().detect(&input, &flat(1.0));
        assert!(report.tests.sensitivity.skipped);
        assert!(report.tests.sensitivity.passed);
    }

    #[test]
    fn non_finite_test_score_is_worst_case() {
        let p = params(50.0);
        let space = space();
        for test_score in [f64::NEG_INFINITY, f64::NAN] {
            let input = DetectionInput {
                train_score: 1.0,
                validation_score: 0.9,
                test_score,
                parameters: &p,
                space: &space,
                oos_scores: &[],
                strategy_returns: &[],
                benchmark_returns: None,
            };
            let report = OverfittingDetector::new(OverfittingConfig::default()).unwrap().detect(&input, &flat(0.3));
            assert_eq!(report.sensitivity_score, 1.0, "test score {test_score}");
            assert!(report.overfitting_score.is_finite());
            assert!((0.0..=1.0).contains(&report.overfitting_score));
            assert_eq!(report.tests.sensitivity.risk, 1.0);
            assert!(!report.passed);
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let cfg = OverfittingConfig { confidence_level: 1.0, ..OverfittingConfig::default() };
        assert_eq!(OverfittingDetector::new(cfg).unwrap_err().kind(), ErrorKind::InvalidConfig);
        let cfg = OverfittingConfig { perturbations: vec![0.0], ..OverfittingConfig::default() };
        assert!(OverfittingDetector::new(cfg).is_err());
    }
}
