//! Adaptive ensemble weights.
//!
//! Four model families (random forest, gradient boosting, LSTM, regime model)
//! share a unit of weight. [`AccuracyHistory`] is a caller-owned rolling record
//! of each model's recent accuracy; [`WeightState::updated`] derives the next
//! weights from it and returns a new value. A `WeightState` is never mutated in
//! place.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of accuracy observations kept per model.
pub const DEFAULT_ACCURACY_WINDOW: usize = 50;

/// Floor applied to target weights so that no model is switched off entirely.
pub const MIN_WEIGHT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleModel {
    RandomForest,
    Xgboost,
    Lstm,
    Regime,
}

impl EnsembleModel {
    pub const ALL: [EnsembleModel; 4] = [
        EnsembleModel::RandomForest,
        EnsembleModel::Xgboost,
        EnsembleModel::Lstm,
        EnsembleModel::Regime,
    ];

    fn slot(self) -> usize {
        match self {
            EnsembleModel::RandomForest => 0,
            EnsembleModel::Xgboost => 1,
            EnsembleModel::Lstm => 2,
            EnsembleModel::Regime => 3,
        }
    }
}

/// Bounded per-model accuracy window, accuracies in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyHistory {
    window: usize,
    records: [VecDeque<f64>; 4],
}

impl Default for AccuracyHistory {
    fn default() -> Self {
        Self::new(DEFAULT_ACCURACY_WINDOW)
    }
}

impl AccuracyHistory {
    /// A window of 0 is treated as 1.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            records: Default::default(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record one accuracy observation. Non-finite values are ignored; others
    /// are clamped into `[0, 1]`. The oldest observation is evicted when full.
    pub fn record(&mut self, model: EnsembleModel, accuracy: f64) {
        if !accuracy.is_finite() {
            return;
        }
        let slot = &mut self.records[model.slot()];
        if slot.len() == self.window {
            slot.pop_front();
        }
        slot.push_back(accuracy.clamp(0.0, 1.0));
    }

    pub fn observations(&self, model: EnsembleModel) -> usize {
        self.records[model.slot()].len()
    }

    /// Mean recent accuracy, or `None` without observations.
    pub fn mean_accuracy(&self, model: EnsembleModel) -> Option<f64> {
        let slot = &self.records[model.slot()];
        if slot.is_empty() {
            None
        } else {
            Some(slot.iter().sum::<f64>() / slot.len() as f64)
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.records {
            slot.clear();
        }
    }
}

/// Immutable ensemble weights; they sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightState {
    pub rf: f64,
    pub xgb: f64,
    pub lstm: f64,
    pub regime: f64,
    pub last_updated_at: DateTime<Utc>,
}

impl Default for WeightState {
    fn default() -> Self {
        Self::equal(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl WeightState {
    /// Equal weights stamped at `at`.
    pub fn equal(at: DateTime<Utc>) -> Self {
        Self {
            rf: 0.25,
            xgb: 0.25,
            lstm: 0.25,
            regime: 0.25,
            last_updated_at: at,
        }
    }

    pub fn weight(&self, model: EnsembleModel) -> f64 {
        self.as_array()[model.slot()]
    }

    fn as_array(&self) -> [f64; 4] {
        [self.rf, self.xgb, self.lstm, self.regime]
    }

    fn from_array(w: [f64; 4], at: DateTime<Utc>) -> Self {
        Self {
            rf: w[0],
            xgb: w[1],
            lstm: w[2],
            regime: w[3],
            last_updated_at: at,
        }
    }

    /// Next weights given recent accuracy.
    ///
    /// Targets are proportional to each model's mean accuracy (a model with no
    /// observations keeps its current weight as target), floored at
    /// [`MIN_WEIGHT`]. The result is `smoothing × current + (1 − smoothing) ×
    /// target`, renormalized to sum 1. `smoothing` is clamped to `[0, 1]`;
    /// 0 jumps straight to the target, 1 keeps the current weights.
    pub fn updated(&self, history: &AccuracyHistory, smoothing: f64, now: DateTime<Utc>) -> Self {
        let current = self.as_array();
        let alpha = if smoothing.is_finite() { smoothing.clamp(0.0, 1.0) } else { 1.0 };

        let mut raw = [0.0; 4];
        for model in EnsembleModel::ALL {
            let i = model.slot();
            raw[i] = history.mean_accuracy(model).unwrap_or(current[i]);
        }
        let raw_total: f64 = raw.iter().sum();
        let target = if raw_total > 0.0 {
            normalize(raw.map(|r| (r / raw_total).max(MIN_WEIGHT)))
        } else {
            [0.25; 4]
        };

        let mut next = [0.0; 4];
        for i in 0..4 {
            next[i] = alpha * current[i] + (1.0 - alpha) * target[i];
        }
        Self::from_array(normalize(next), now)
    }
}

fn normalize(w: [f64; 4]) -> [f64; 4] {
    let total: f64 = w.iter().sum();
    if total > 0.0 && total.is_finite() {
        w.map(|x| x / total)
    } else {
        [0.25; 4]
    }
}
