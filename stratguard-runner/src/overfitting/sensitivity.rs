//! Parameter sensitivity: how much the score moves when each numeric
//! parameter is nudged.
//!
//! Each numeric parameter is perturbed by every configured fraction of its
//! value (or of its range when the value is 0), snapped back into bounds and
//! re-scored. Sensitivity is the mean relative score change. Categorical
//! parameters are not perturbed. A perturbation whose evaluation fails,
//! panics or returns a non-finite score counts as a 100% change.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stratguard_core::domain::{Objective, ParamValue, ParameterSet, ParameterSpace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSensitivity {
    pub name: String,
    pub base_value: f64,
    /// Mean relative score change across perturbations.
    pub sensitivity: f64,
    pub failed_perturbations: usize,
    pub unstable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityAnalysis {
    /// Mean sensitivity across perturbed parameters (0 when none).
    pub score: f64,
    pub parameters: Vec<ParameterSensitivity>,
    pub unstable: Vec<String>,
}

/// Perturb every numeric parameter of `params` and re-score it.
pub fn analyze(
    space: &ParameterSpace,
    params: &ParameterSet,
    base_score: f64,
    objective: &dyn Objective,
    perturbations: &[f64],
    unstable_threshold: f64,
) -> SensitivityAnalysis {
    let jobs: Vec<(usize, ParameterSet)> = space
        .specs()
        .iter()
        .enumerate()
        .filter(|(_, spec)| spec.is_numeric())
        .filter_map(|(i, spec)| params.number(&spec.name).map(|v| (i, spec, v)))
        .flat_map(|(i, spec, v)| {
            perturbations.iter().map(move |&pct| {
                let delta = if v == 0.0 { (spec.max - spec.min) * pct } else { v * pct };
                (i, params.with_value(&spec.name, ParamValue::Number(spec.snap(v + delta))))
            })
        })
        .collect();

    let scores: Vec<Option<f64>> = jobs.par_iter().map(|(_, p)| score(objective, p)).collect();

    let denom = if base_score.abs() > 1e-12 { base_score.abs() } else { 1.0 };
    let mut parameters = Vec::new();
    for (i, spec) in space.specs().iter().enumerate() {
        let changes: Vec<Option<f64>> = jobs
            .iter()
            .zip(&scores)
            .filter(|((j, _), _)| *j == i)
            .map(|(_, s)| s.map(|s| relative_change(s, base_score, denom)))
            .collect();
        if changes.is_empty() {
            continue;
        }
        let failed = changes.iter().filter(|c| c.is_none()).count();
        let sensitivity =
            changes.iter().map(|c| c.unwrap_or(1.0)).sum::<f64>() / changes.len() as f64;
        if failed > 0 {
            warn!(parameter = %spec.name, failed, "perturbed evaluations failed");
        }
        parameters.push(ParameterSensitivity {
            name: spec.name.clone(),
            base_value: params.number(&spec.name).unwrap_or(spec.min),
            sensitivity,
            failed_perturbations: failed,
            unstable: sensitivity > unstable_threshold,
        });
    }

    let score = if parameters.is_empty() {
        0.0
    } else {
        parameters.iter().map(|p| p.sensitivity).sum::<f64>() / parameters.len() as f64
    };
    let unstable = parameters.iter().filter(|p| p.unstable).map(|p| p.name.clone()).collect();
    debug!(score, evaluations = jobs.len(), "sensitivity analysis done");

    SensitivityAnalysis { score, parameters, unstable }
}

/// A non-finite base score leaves nothing to compare against: full change.
fn relative_change(score: f64, base_score: f64, denom: f64) -> f64 {
    let change = (score - base_score).abs() / denom;
    if base_score.is_finite() && change.is_finite() {
        change
    } else {
        1.0
    }
}

/// Risk contribution in `[0, 1]`: 0.5 at the pass threshold.
pub fn sensitivity_risk(score: f64, max_sensitivity: f64) -> f64 {
    if max_sensitivity <= 0.0 {
        return if score > 0.0 { 1.0 } else { 0.0 };
    }
    (score / (2.0 * max_sensitivity)).clamp(0.0, 1.0)
}

fn score(objective: &dyn Objective, params: &ParameterSet) -> Option<f64> {
    match catch_unwind(AssertUnwindSafe(|| objective.evaluate(params))) {
        Ok(Ok(r)) if r.score.is_finite() => Some(r.score),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratguard_core::domain::{EvaluationError, ObjectiveResult, ParameterSpec};

    const PCTS: [f64; 4] = [-0.10, -0.05, 0.05, 0.10];

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::continuous("a", 0.0, 10.0),
            ParameterSpec::continuous("b", -1.0, 1.0),
            ParameterSpec::categorical("mode", ["x", "y"]),
        ])
        .unwrap()
    }

    fn set(a: f64, b: f64) -> ParameterSet {
        let values = [
            ("a".to_string(), ParamValue::Number(a)),
            ("b".to_string(), ParamValue::Number(b)),
            ("mode".to_string(), ParamValue::Choice("x".into())),
        ];
        space().make_set(values.into_iter().collect()).unwrap()
    }

    #[test]
    fn flat_objective_is_insensitive() {
        let flat = |_: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            Ok(ObjectiveResult::from_score(2.0))
        };
        let r = analyze(&space(), &set(5.0, 0.5), 2.0, &flat, &PCTS, 0.25);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.parameters.len(), 2);
        assert!(r.unstable.is_empty());
    }

    #[test]
    fn proportional_objective() {
        // score = a: ±5% and ±10% of a move the score by the same fraction.
        let linear = |p: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            Ok(ObjectiveResult::from_score(p.number("a").unwrap_or(0.0)))
        };
        let r = analyze(&space(), &set(5.0, 0.5), 5.0, &linear, &PCTS, 0.25);
        let a = r.parameters.iter().find(|p| p.name == "a").unwrap();
        assert!((a.sensitivity - 0.075).abs() < 1e-9);
        let b = r.parameters.iter().find(|p| p.name == "b").unwrap();
        assert_eq!(b.sensitivity, 0.0);
        assert!((r.score - 0.0375).abs() < 1e-9);
    }

    #[test]
    fn zero_value_uses_range() {
        // b = 0 is perturbed by pct × range (2.0).
        let on_b = |p: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            Ok(ObjectiveResult::from_score(1.0 + p.number("b").unwrap_or(0.0)))
        };
        let r = analyze(&space(), &set(5.0, 0.0), 1.0, &on_b, &PCTS, 0.12);
        let b = r.parameters.iter().find(|p| p.name == "b").unwrap();
        assert!((b.sensitivity - 0.15).abs() < 1e-9);
        assert!(b.unstable);
        assert_eq!(r.unstable, vec!["b".to_string()]);
    }

    #[test]
    fn failed_perturbations_count_fully() {
        let fragile = |p: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            if p.number("a") == Some(5.0) {
                Ok(ObjectiveResult::from_score(1.0))
            } else {
                Err(EvaluationError::new("unstable"))
            }
        };
        let r = analyze(&space(), &set(5.0, 0.5), 1.0, &fragile, &PCTS, 0.25);
        let a = r.parameters.iter().find(|p| p.name == "a").unwrap();
        assert_eq!(a.failed_perturbations, 4);
        assert_eq!(a.sensitivity, 1.0);
    }

    #[test]
    fn non_finite_base_counts_fully() {
        let flat = |_: &ParameterSet| -> Result<ObjectiveResult, EvaluationError> {
            Ok(ObjectiveResult::from_score(0.3))
        };
        for base in [f64::NEG_INFINITY, f64::INFINITY, f64::NAN] {
            let r = analyze(&space(), &set(5.0, 0.5), base, &flat, &PCTS, 0.25);
            assert_eq!(r.score, 1.0, "base {base}");
            assert_eq!(r.unstable.len(), 2);
        }
    }

    #[test]
    fn risk_is_bounded() {
        assert_eq!(sensitivity_risk(0.0, 0.15), 0.0);
        assert!((sensitivity_risk(0.15, 0.15) - 0.5).abs() < 1e-12);
        assert_eq!(sensitivity_risk(5.0, 0.15), 1.0);
    }
}
