//! Objective contract — how callers plug a strategy into the optimizer.
//!
//! The engine never runs a backtest itself. It hands a [`ParameterSet`] to a
//! caller-supplied [`Objective`] and receives a score (higher is better) plus
//! reporting metrics. Objectives must be deterministic for identical inputs;
//! the overfitting tests lose their meaning otherwise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::parameter::ParameterSet;
use crate::error::ErrorKind;
use crate::metrics::StrategyMetrics;
use crate::split::IndexRange;

/// Outcome of one objective evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveResult {
    /// Optimization target. Higher is better.
    pub score: f64,
    #[serde(default)]
    pub metrics: StrategyMetrics,
    /// Per-period strategy returns over the evaluated window, when the
    /// objective reports them. Feeds the significance test.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<f64>,
}

impl ObjectiveResult {
    /// A bare score with zeroed metrics.
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            metrics: StrategyMetrics::default(),
            returns: Vec::new(),
        }
    }

    pub fn with_metrics(score: f64, metrics: StrategyMetrics) -> Self {
        Self {
            score,
            metrics,
            returns: Vec::new(),
        }
    }

    pub fn with_returns(mut self, returns: Vec<f64>) -> Self {
        self.returns = returns;
        self
    }
}

/// The caller's objective failed for one parameter set.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("evaluation failed: {message}")]
pub struct EvaluationError {
    pub message: String,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::EvaluationFailure
    }
}

/// Scores a parameter set.
pub trait Objective: Send + Sync {
    fn evaluate(&self, params: &ParameterSet) -> Result<ObjectiveResult, EvaluationError>;
}

impl<F> Objective for F
where
    F: Fn(&ParameterSet) -> Result<ObjectiveResult, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, params: &ParameterSet) -> Result<ObjectiveResult, EvaluationError> {
        self(params)
    }
}

/// Scores a parameter set over a window `[start, end)` of the caller's series.
///
/// Used by walk-forward validation, which re-scores the same candidate on the
/// train, validation and test partitions of each split.
pub trait WindowObjective: Send + Sync {
    fn evaluate_window(
        &self,
        params: &ParameterSet,
        window: IndexRange,
    ) -> Result<ObjectiveResult, EvaluationError>;
}

impl<F> WindowObjective for F
where
    F: Fn(&ParameterSet, IndexRange) -> Result<ObjectiveResult, EvaluationError> + Send + Sync,
{
    fn evaluate_window(
        &self,
        params: &ParameterSet,
        window: IndexRange,
    ) -> Result<ObjectiveResult, EvaluationError> {
        self(params, window)
    }
}

/// A [`WindowObjective`] pinned to one window, usable wherever an
/// [`Objective`] is expected.
pub struct Windowed<'a, W: WindowObjective + ?Sized> {
    inner: &'a W,
    window: IndexRange,
}

impl<'a, W: WindowObjective + ?Sized> Windowed<'a, W> {
    pub fn new(inner: &'a W, window: IndexRange) -> Self {
        Self { inner, window }
    }

    pub fn window(&self) -> IndexRange {
        self.window
    }
}

impl<W: WindowObjective + ?Sized> Objective for Windowed<'_, W> {
    fn evaluate(&self, params: &ParameterSet) -> Result<ObjectiveResult, EvaluationError> {
        self.inner.evaluate_window(params, self.window)
    }
}
