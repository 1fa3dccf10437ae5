//! Fitness function — configurable selector for ranking evaluations.

use serde::{Deserialize, Serialize};

use stratguard_core::domain::{EvaluationError, Objective, ObjectiveResult, ParameterSet};

/// Which value of an [`ObjectiveResult`] the optimizer maximizes.
///
/// `Score` (the default) ranks by the objective's own score; the others rank
/// by one field of the reported metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMetric {
    #[default]
    Score,
    Sharpe,
    Sortino,
    TotalReturn,
    WinRate,
    ProfitFactor,
    MaxDrawdown,
}

impl FitnessMetric {
    /// Extract the ranking value.
    pub fn extract(&self, result: &ObjectiveResult) -> f64 {
        let m = &result.metrics;
        match self {
            Self::Score => result.score,
            Self::Sharpe => m.sharpe,
            Self::Sortino => m.sortino,
            Self::TotalReturn => m.total_return,
            Self::WinRate => m.win_rate,
            Self::ProfitFactor => m.profit_factor,
            Self::MaxDrawdown => m.max_drawdown,
        }
    }

    /// Returns true if `a` ranks above `b`.
    ///
    /// Max drawdown is stored as a negative fraction, so `a > b` is correct for
    /// every metric: -0.05 beats -0.20.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Sharpe => "sharpe",
            Self::Sortino => "sortino",
            Self::TotalReturn => "total_return",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
            Self::MaxDrawdown => "max_drawdown",
        }
    }
}

impl std::fmt::Display for FitnessMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An objective whose score is replaced by the selected fitness value, so
/// downstream consumers (validation, perturbation) rank the same way the
/// optimizer did.
pub struct RankedBy<'a> {
    inner: &'a dyn Objective,
    fitness: FitnessMetric,
}

impl<'a> RankedBy<'a> {
    pub fn new(inner: &'a dyn Objective, fitness: FitnessMetric) -> Self {
        Self { inner, fitness }
    }
}

impl Objective for RankedBy<'_> {
    fn evaluate(&self, params: &ParameterSet) -> Result<ObjectiveResult, EvaluationError> {
        let result = self.inner.evaluate(params)?;
        Ok(ObjectiveResult {
            score: self.fitness.extract(&result),
            ..result
        })
    }
}
