//! Time-series splitting — leakage-free train / validation / test partitions.
//!
//! Three layouts are supported:
//! - **walk-forward**: a rolling window advanced by `step_size`
//! - **k-fold**: `k + 1` chronological blocks, fold *i* trains on the first
//!   `i + 1` blocks and tests on the next one
//! - **expanding**: anchored folds whose train window grows by one test chunk
//!
//! Every emitted [`Split`] is chronological and disjoint, never extends past
//! the series, and keeps `purge_gap` unused bars between consecutive
//! non-empty partitions, so `train.end + purge_gap <= test.start` always holds.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;

// ─── Ranges ──────────────────────────────────────────────────────────

/// Half-open index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Empty range anchored at `at`.
    pub fn empty_at(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    /// Whether the two ranges share at least one index.
    pub fn overlaps(&self, other: &IndexRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }

    /// The sub-slice of `data` covered by this range, clamped to its length.
    pub fn slice<'a, T>(&self, data: &'a [T]) -> &'a [T] {
        let end = self.end.min(data.len());
        let start = self.start.min(end);
        &data[start..end]
    }
}

/// One train / validation / test partition of a series.
///
/// `validation` is empty (anchored at `train.end`) when the layout does not
/// carve one out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub fold: usize,
    pub train: IndexRange,
    pub validation: IndexRange,
    pub test: IndexRange,
}

impl Split {
    pub fn train_slice<'a, T>(&self, data: &'a [T]) -> &'a [T] {
        self.train.slice(data)
    }

    pub fn validation_slice<'a, T>(&self, data: &'a [T]) -> &'a [T] {
        self.validation.slice(data)
    }

    pub fn test_slice<'a, T>(&self, data: &'a [T]) -> &'a [T] {
        self.test.slice(data)
    }

    /// Check the no-leakage invariants against a purge gap and series length.
    pub fn is_leak_free(&self, purge_gap: usize, series_len: usize) -> bool {
        let ordered = if self.validation.is_empty() {
            self.train.end + purge_gap <= self.test.start
        } else {
            self.train.end + purge_gap <= self.validation.start
                && self.validation.end + purge_gap <= self.test.start
        };
        ordered
            && !self.train.is_empty()
            && !self.test.is_empty()
            && !self.train.overlaps(&self.validation)
            && !self.train.overlaps(&self.test)
            && !self.validation.overlaps(&self.test)
            && self.test.end <= series_len
    }
}

// ─── Configuration ───────────────────────────────────────────────────

/// Split layout and its windows (all in bars).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SplitMode {
    WalkForward {
        train_window: usize,
        #[serde(default)]
        validation_window: usize,
        test_window: usize,
        step_size: usize,
        #[serde(default)]
        purge_gap: usize,
    },
    KFold {
        k: usize,
        #[serde(default)]
        purge_gap: usize,
        /// Fraction of each train block held back as a validation tail, in `[0, 1)`.
        #[serde(default)]
        validation_fraction: f64,
    },
    Expanding {
        n_folds: usize,
        min_train: usize,
        min_test: usize,
        #[serde(default)]
        purge_gap: usize,
    },
}

impl Default for SplitMode {
    /// One trading year of training, a quarter each of validation and test,
    /// rolled forward by a quarter with a one-week purge.
    fn default() -> Self {
        SplitMode::WalkForward {
            train_window: 252,
            validation_window: 63,
            test_window: 63,
            step_size: 63,
            purge_gap: 5,
        }
    }
}

impl SplitMode {
    pub fn purge_gap(&self) -> usize {
        match *self {
            SplitMode::WalkForward { purge_gap, .. }
            | SplitMode::KFold { purge_gap, .. }
            | SplitMode::Expanding { purge_gap, .. } => purge_gap,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("fold {fold} would have an empty test range")]
    EmptyTestRange { fold: usize },
    #[error("invalid split configuration: {0}")]
    InvalidConfig(String),
}

impl SplitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::InsufficientData { .. } | SplitError::EmptyTestRange { .. } => {
                ErrorKind::InsufficientData
            }
            SplitError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

// ─── Splitter ────────────────────────────────────────────────────────

/// Partitions a series of `series_len` bars into [`Split`]s.
pub struct TimeSeriesSplitter;

impl TimeSeriesSplitter {
    pub fn split(series_len: usize, mode: &SplitMode) -> Result<Vec<Split>, SplitError> {
        let splits = match *mode {
            SplitMode::WalkForward {
                train_window,
                validation_window,
                test_window,
                step_size,
                purge_gap,
            } => walk_forward(
                series_len,
                train_window,
                validation_window,
                test_window,
                step_size,
                purge_gap,
            )?,
            SplitMode::KFold {
                k,
                purge_gap,
                validation_fraction,
            } => k_fold(series_len, k, purge_gap, validation_fraction)?,
            SplitMode::Expanding {
                n_folds,
                min_train,
                min_test,
                purge_gap,
            } => expanding(series_len, n_folds, min_train, min_test, purge_gap)?,
        };
        debug!(series_len, splits = splits.len(), "time series split");
        Ok(splits)
    }
}

fn walk_forward(
    series_len: usize,
    train_window: usize,
    validation_window: usize,
    test_window: usize,
    step_size: usize,
    purge_gap: usize,
) -> Result<Vec<Split>, SplitError> {
    if train_window == 0 || test_window == 0 {
        return Err(SplitError::InvalidConfig(
            "train_window and test_window must be > 0".into(),
        ));
    }
    if step_size == 0 {
        return Err(SplitError::InvalidConfig("step_size must be > 0".into()));
    }

    let gaps = if validation_window > 0 { 2 } else { 1 };
    let required = [train_window, validation_window, test_window]
        .into_iter()
        .try_fold(purge_gap.saturating_mul(gaps), usize::checked_add)
        .unwrap_or(usize::MAX);
    if required > series_len {
        return Err(SplitError::InsufficientData {
            required,
            available: series_len,
        });
    }

    let last_start = series_len - required;
    let mut splits = Vec::new();
    let mut start = 0;
    while start <= last_start {
        let train = IndexRange::new(start, start + train_window);
        let validation = if validation_window > 0 {
            let v_start = train.end + purge_gap;
            IndexRange::new(v_start, v_start + validation_window)
        } else {
            IndexRange::empty_at(train.end)
        };
        let test_start = if validation_window > 0 {
            validation.end + purge_gap
        } else {
            train.end + purge_gap
        };
        splits.push(Split {
            fold: splits.len(),
            train,
            validation,
            test: IndexRange::new(test_start, test_start + test_window),
        });
        start = match start.checked_add(step_size) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(splits)
}

fn k_fold(
    series_len: usize,
    k: usize,
    purge_gap: usize,
    validation_fraction: f64,
) -> Result<Vec<Split>, SplitError> {
    if k == 0 {
        return Err(SplitError::InvalidConfig("k must be > 0".into()));
    }
    if !(0.0..1.0).contains(&validation_fraction) {
        return Err(SplitError::InvalidConfig(format!(
            "validation_fraction must be in [0, 1), got {validation_fraction}"
        )));
    }

    let block = series_len / k.saturating_add(1);
    if block == 0 {
        return Err(SplitError::InsufficientData {
            required: k.saturating_add(1),
            available: series_len,
        });
    }

    let mut splits = Vec::with_capacity(k);
    for i in 0..k {
        let block_end = (i + 1) * block;
        let test_start = block_end.saturating_add(purge_gap);
        let test_end = if i == k - 1 {
            series_len
        } else {
            (i + 2) * block
        };
        if test_start >= test_end {
            return Err(SplitError::EmptyTestRange { fold: i });
        }

        let val_len = (block_end as f64 * validation_fraction).floor() as usize;
        let (train, validation) = if val_len > 0 {
            let validation = IndexRange::new(block_end - val_len, block_end);
            let train_end = validation.start.saturating_sub(purge_gap);
            (IndexRange::new(0, train_end), validation)
        } else {
            (IndexRange::new(0, block_end), IndexRange::empty_at(block_end))
        };
        if train.is_empty() {
            return Err(SplitError::InsufficientData {
                required: val_len.saturating_add(purge_gap).saturating_add(1),
                available: block_end,
            });
        }

        splits.push(Split {
            fold: i,
            train,
            validation,
            test: IndexRange::new(test_start, test_end),
        });
    }
    Ok(splits)
}

fn expanding(
    series_len: usize,
    n_folds: usize,
    min_train: usize,
    min_test: usize,
    purge_gap: usize,
) -> Result<Vec<Split>, SplitError> {
    if n_folds == 0 || min_train == 0 {
        return Err(SplitError::InvalidConfig(
            "n_folds and min_train must be > 0".into(),
        ));
    }

    let min_chunk = min_test.max(1);
    let required = n_folds
        .checked_mul(min_chunk)
        .and_then(|folds| folds.checked_add(min_train))
        .and_then(|r| r.checked_add(purge_gap))
        .unwrap_or(usize::MAX);
    if required > series_len {
        return Err(SplitError::InsufficientData {
            required,
            available: series_len,
        });
    }

    // Remaining bars after the initial train window and purge, shared by the folds.
    let chunk = (series_len - min_train - purge_gap) / n_folds;

    let splits = (0..n_folds)
        .map(|i| {
            let train_end = min_train + i * chunk;
            let test_start = train_end + purge_gap;
            Split {
                fold: i,
                train: IndexRange::new(0, train_end),
                validation: IndexRange::empty_at(train_end),
                test: IndexRange::new(test_start, test_start + chunk),
            }
        })
        .collect();
    Ok(splits)
}
