//! Error kinds shared by every component.
//!
//! Each module owns a concrete `thiserror` enum (`SplitError`, `SizingError`,
//! ...). They all map onto a small closed set of kinds so that front-ends can
//! decide exit codes and presentation without matching on every variant.

use serde::{Deserialize, Serialize};

/// Coarse classification of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Series or history too short for the requested window or statistic.
    InsufficientData,
    /// Malformed parameter specification (min > max, missing step, ...).
    InvalidParameterSpace,
    /// Singular / NaN input, zero-width stop loss, zero variance.
    DegenerateInput,
    /// The caller's objective failed. Recorded, never fatal during a search.
    EvaluationFailure,
    /// A configuration value is out of its valid range.
    InvalidConfig,
}

impl ErrorKind {
    /// Structural errors that callers are expected to surface as a failed
    /// command rather than a crash.
    pub fn is_input_error(self) -> bool {
        matches!(
            self,
            ErrorKind::InsufficientData | ErrorKind::InvalidParameterSpace
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InsufficientData => "insufficient data",
            ErrorKind::InvalidParameterSpace => "invalid parameter space",
            ErrorKind::DegenerateInput => "degenerate input",
            ErrorKind::EvaluationFailure => "evaluation failure",
            ErrorKind::InvalidConfig => "invalid configuration",
        };
        f.write_str(s)
    }
}
