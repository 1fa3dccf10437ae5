//! StratGuard Runner — parameter search and overfitting validation.
//!
//! This crate builds on `stratguard-core` to provide:
//! - Parameter optimizer: grid, random, genetic, particle swarm, Bayesian
//! - Configurable fitness selector
//! - Overfitting detector (degradation, sensitivity, white noise, significance)
//! - Walk-forward validation pipeline
//! - TOML engine configuration

pub mod config;
pub mod fitness;
pub mod optimizer;
pub mod overfitting;
pub mod walk_forward;

pub use config::{ConfigError, EngineConfig};
pub use fitness::{FitnessMetric, RankedBy};
pub use optimizer::{
    EvaluationRecord, OptimizationMethod, OptimizationResult, OptimizeError, Optimizer,
    OptimizerConfig, OptimizerProgress,
};
pub use overfitting::{
    DetectionInput, OverfittingConfig, OverfittingDetector, OverfittingError, OverfittingReport,
    Severity,
};
pub use walk_forward::{
    validate_strategy, DegradationFlag, FoldReport, ValidationConfig, ValidationError,
    ValidationReport,
};
