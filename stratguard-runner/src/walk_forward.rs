//! Walk-forward validation — optimize, validate and test a strategy on every
//! split of its series, then aggregate.
//!
//! Per split:
//! 1. optimize on the train window
//! 2. re-score the top `validation_top_k` distinct candidates on the
//!    validation window and keep the best (train ranking when the split has
//!    no validation window)
//! 3. re-score the winner on the held-out test window
//! 4. run the overfitting detector: perturbations on the test window, the
//!    out-of-sample score history as residuals, the test window's reported
//!    returns for significance
//!
//! The aggregate reports mean train / validation / test scores, the
//! train-to-test degradation ratio with its edge-case flag, and a one-sided
//! t-test on fold-level test scores.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use stratguard_core::cancel::{RunControl, StopReason};
use stratguard_core::domain::{Objective, ParameterSet, ParameterSpace, WindowObjective, Windowed};
use stratguard_core::error::ErrorKind;
use stratguard_core::split::{IndexRange, Split, SplitError, SplitMode, TimeSeriesSplitter};
use stratguard_core::stats::{mean, one_sided_t_test, TTestResult};

use crate::fitness::RankedBy;
use crate::optimizer::{OptimizeError, OptimizationResult, Optimizer, OptimizerConfig, OptimizerProgress};
use crate::overfitting::{DetectionInput, OverfittingConfig, OverfittingDetector, OverfittingError, OverfittingReport};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Split layout (default walk-forward 252 / 63 / 63, step 63, purge 5).
    pub split: SplitMode,
    pub optimizer: OptimizerConfig,
    pub overfitting: OverfittingConfig,
    /// Train candidates re-scored on the validation window (default 5).
    pub validation_top_k: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            split: SplitMode::default(),
            optimizer: OptimizerConfig::default(),
            overfitting: OverfittingConfig::default(),
            validation_top_k: 5,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// How the degradation ratio was computed (or why it wasn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradationFlag {
    /// Train score >= 0.1, ratio computed normally.
    Normal,
    /// Train score < 0.1, using the difference (test − train) instead.
    LowTrainScore,
    /// Train score is negative, ratio skipped entirely.
    NegativeTrainScore,
    /// Train score positive (>= 0.1) but test score negative: clamped to 0.0.
    FailedTest,
    /// No fold produced a test score.
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: usize,
    pub train: IndexRange,
    pub validation: IndexRange,
    pub test: IndexRange,
    pub parameters: ParameterSet,
    pub train_score: f64,
    pub validation_score: f64,
    pub test_score: f64,
    pub evaluations: usize,
    pub candidates_validated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_error: Option<String>,
    pub overfitting: OverfittingReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub folds: Vec<FoldReport>,
    /// Splits whose optimization produced no successful candidate.
    pub skipped_folds: Vec<usize>,
    pub mean_train_score: f64,
    pub mean_validation_score: f64,
    pub mean_test_score: f64,
    /// Mean test / mean train. `None` when not computable (see `degradation_flag`).
    pub degradation_ratio: Option<f64>,
    pub degradation_flag: DegradationFlag,
    /// t-test on fold-level test scores (H0: mean <= 0, H1: mean > 0).
    pub t_test: Option<TTestResult>,
    /// Fraction of folds whose overfitting report passed.
    pub pass_rate: f64,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        !self.folds.is_empty() && self.folds.iter().all(|f| f.overfitting.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
    #[error(transparent)]
    Overfitting(#[from] OverfittingError),
    #[error("invalid validation configuration: {0}")]
    InvalidConfig(String),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::Split(e) => e.kind(),
            ValidationError::Optimize(e) => e.kind(),
            ValidationError::Overfitting(e) => e.kind(),
            ValidationError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

// ─── Orchestration ───────────────────────────────────────────────────

/// Run walk-forward validation of `objective` over a series of `series_len` bars.
///
/// Configuration and split errors fail before any evaluation. Cancellation or
/// a timeout stops between folds (and inside each optimization) and returns
/// the folds completed so far with the matching flag.
pub fn validate_strategy(
    space: &ParameterSpace,
    objective: &dyn WindowObjective,
    series_len: usize,
    config: &ValidationConfig,
    control: &RunControl<OptimizerProgress>,
) -> Result<ValidationReport, ValidationError> {
    if config.validation_top_k == 0 {
        return Err(ValidationError::InvalidConfig("validation_top_k must be > 0".into()));
    }
    let splits = TimeSeriesSplitter::split(series_len, &config.split)?;
    let optimizer = Optimizer::new(config.optimizer.clone())?;
    let detector = OverfittingDetector::new(config.overfitting.clone())?;
    info!(splits = splits.len(), series_len, method = %config.optimizer.method, "walk-forward validation started");

    let mut folds: Vec<FoldReport> = Vec::with_capacity(splits.len());
    let mut skipped_folds = Vec::new();
    let mut stop = None;

    for split in &splits {
        if let Some(reason) = control.stop_reason() {
            stop = Some(reason);
            break;
        }
        let optimized = optimizer.optimize(space, &Windowed::new(objective, split.train), control)?;
        if optimized.cancelled {
            stop = Some(StopReason::Cancelled);
        } else if optimized.timed_out {
            stop = Some(StopReason::TimedOut);
        }

        let prior_tests: Vec<f64> = folds.iter().map(|f| f.test_score).collect();
        match run_fold(split, space, objective, &optimized, config, &detector, &prior_tests) {
            Some(fold) => {
                debug!(
                    fold = fold.fold,
                    train = fold.train_score,
                    validation = fold.validation_score,
                    test = fold.test_score,
                    passed = fold.overfitting.passed,
                    "fold done"
                );
                folds.push(fold);
            }
            None => {
                warn!(fold = split.fold, "no successful candidate, fold skipped");
                skipped_folds.push(split.fold);
            }
        }
        if stop.is_some() {
            break;
        }
    }

    let report = aggregate(folds, skipped_folds, stop);
    info!(
        folds = report.folds.len(),
        mean_test = report.mean_test_score,
        pass_rate = report.pass_rate,
        "walk-forward validation finished"
    );
    Ok(report)
}

fn run_fold(
    split: &Split,
    space: &ParameterSpace,
    objective: &dyn WindowObjective,
    optimized: &OptimizationResult,
    config: &ValidationConfig,
    detector: &OverfittingDetector,
    prior_tests: &[f64],
) -> Option<FoldReport> {
    let fitness = config.optimizer.fitness;
    let candidates = optimized.top_k(config.validation_top_k);
    let first = candidates.first()?;

    let validation_window = Windowed::new(objective, split.validation);
    let validation = RankedBy::new(&validation_window, fitness);
    let (winner, validation_score) = if split.validation.is_empty() {
        (*first, first.fitness)
    } else {
        // Highest validation score; earlier (better-trained) candidates keep ties.
        let mut best = (*first, f64::NEG_INFINITY);
        for candidate in &candidates {
            let score = validation
                .evaluate(&candidate.parameters)
                .ok()
                .map(|r| r.score)
                .filter(|s| s.is_finite())
                .unwrap_or(f64::NEG_INFINITY);
            if score > best.1 {
                best = (*candidate, score);
            }
        }
        best
    };

    let test_window = Windowed::new(objective, split.test);
    let test = RankedBy::new(&test_window, fitness);
    let (test_score, returns, test_error) = match test.evaluate(&winner.parameters) {
        Ok(r) if r.score.is_finite() => (r.score, r.returns, None),
        Ok(r) => (f64::NEG_INFINITY, Vec::new(), Some(format!("non-finite test score {}", r.score))),
        Err(e) => (f64::NEG_INFINITY, Vec::new(), Some(e.to_string())),
    };

    let oos_scores: Vec<f64> = prior_tests
        .iter()
        .copied()
        .chain([validation_score, test_score])
        .filter(|s| s.is_finite())
        .collect();
    let overfitting = detector.detect(
        &DetectionInput {
            train_score: winner.fitness,
            validation_score,
            test_score,
            parameters: &winner.parameters,
            space,
            oos_scores: &oos_scores,
            strategy_returns: &returns,
            benchmark_returns: None,
        },
        &test,
    );

    Some(FoldReport {
        fold: split.fold,
        train: split.train,
        validation: split.validation,
        test: split.test,
        parameters: winner.parameters.clone(),
        train_score: winner.fitness,
        validation_score,
        test_score,
        evaluations: optimized.evaluations,
        candidates_validated: if split.validation.is_empty() { 0 } else { candidates.len() },
        test_error,
        overfitting,
    })
}

fn aggregate(folds: Vec<FoldReport>, skipped_folds: Vec<usize>, stop: Option<StopReason>) -> ValidationReport {
    let finite = |xs: Vec<f64>| -> Vec<f64> { xs.into_iter().filter(|x| x.is_finite()).collect() };
    let train = finite(folds.iter().map(|f| f.train_score).collect());
    let validation = finite(folds.iter().map(|f| f.validation_score).collect());
    let test = finite(folds.iter().map(|f| f.test_score).collect());

    let mean_train_score = mean(&train);
    let mean_test_score = mean(&test);
    let (degradation_ratio, degradation_flag) = if test.is_empty() {
        (None, DegradationFlag::InsufficientData)
    } else {
        compute_degradation_ratio(mean_train_score, mean_test_score)
    };
    let pass_rate = if folds.is_empty() {
        0.0
    } else {
        folds.iter().filter(|f| f.overfitting.passed).count() as f64 / folds.len() as f64
    };

    ValidationReport {
        mean_train_score,
        mean_validation_score: mean(&validation),
        mean_test_score,
        degradation_ratio,
        degradation_flag,
        t_test: one_sided_t_test(&test),
        pass_rate,
        timed_out: stop == Some(StopReason::TimedOut),
        cancelled: stop == Some(StopReason::Cancelled),
        folds,
        skipped_folds,
    }
}

/// Degradation ratio with edge-case handling.
///
/// - train >= 0.1: ratio = test / train (Normal)
/// - 0 <= train < 0.1: difference = test − train (LowTrainScore)
/// - train < 0: ratio skipped (NegativeTrainScore)
/// - train >= 0.1 but test < 0: clamped to 0.0 (FailedTest)
fn compute_degradation_ratio(mean_train: f64, mean_test: f64) -> (Option<f64>, DegradationFlag) {
    if mean_train < 0.0 {
        (None, DegradationFlag::NegativeTrainScore)
    } else if mean_train < 0.1 {
        (Some(mean_test - mean_train), DegradationFlag::LowTrainScore)
    } else if mean_test < 0.0 {
        // Positive train but negative test: canonical overfit signature
        (Some(0.0), DegradationFlag::FailedTest)
    } else {
        (Some(mean_test / mean_train), DegradationFlag::Normal)
    }
}
