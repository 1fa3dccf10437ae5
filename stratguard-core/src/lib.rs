//! StratGuard Core — domain types, statistics and portfolio risk.
//!
//! This crate contains everything that does not search a parameter space:
//! - Domain types (bars, parameter space and sets, the objective contract,
//!   portfolio snapshot) and the shared error kinds
//! - Statistics primitives and strategy metrics
//! - Deterministic RNG hierarchy and cooperative run control
//! - Leakage-free time-series splitting (walk-forward, k-fold, expanding)
//! - Position sizing (risk budget, volatility, correlation, Kelly, caps)
//! - Correlation, concentration and hedge analysis
//! - Scenario and Monte Carlo stress testing
//! - Adaptive ensemble weights

pub mod cancel;
pub mod correlation;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod rng;
pub mod sizing;
pub mod split;
pub mod stats;
pub mod stress;
pub mod weights;

pub use error::ErrorKind;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: every result and config type crosses threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::ParameterSpace>();
        require_sync::<domain::ParameterSpace>();
        require_send::<domain::ParameterSet>();
        require_sync::<domain::ParameterSet>();
        require_send::<domain::ObjectiveResult>();
        require_sync::<domain::ObjectiveResult>();
        require_send::<domain::PortfolioSnapshot>();
        require_sync::<domain::PortfolioSnapshot>();
        require_send::<metrics::StrategyMetrics>();
        require_sync::<metrics::StrategyMetrics>();

        // Splitting
        require_send::<split::Split>();
        require_sync::<split::Split>();
        require_send::<split::SplitMode>();
        require_sync::<split::SplitMode>();

        // Run control
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
        require_send::<cancel::CancellationToken>();
        require_sync::<cancel::CancellationToken>();
        require_send::<cancel::RunControl<String>>();
        require_sync::<cancel::RunControl<String>>();

        // Risk
        require_send::<sizing::PositionSizer>();
        require_sync::<sizing::PositionSizer>();
        require_send::<sizing::SizingResult>();
        require_sync::<sizing::SizingResult>();
        require_send::<correlation::CorrelationManager>();
        require_sync::<correlation::CorrelationManager>();
        require_send::<correlation::CorrelationMatrix>();
        require_sync::<correlation::CorrelationMatrix>();
        require_send::<correlation::RiskAlert>();
        require_sync::<correlation::RiskAlert>();
        require_send::<stress::StressTestEngine>();
        require_sync::<stress::StressTestEngine>();
        require_send::<stress::StressResult>();
        require_sync::<stress::StressResult>();
        require_send::<stress::MonteCarloSummary>();
        require_sync::<stress::MonteCarloSummary>();

        // Weights
        require_send::<weights::WeightState>();
        require_sync::<weights::WeightState>();
        require_send::<weights::AccuracyHistory>();
        require_sync::<weights::AccuracyHistory>();
    }

    /// The objective contract takes only a parameter set: no portfolio, no
    /// mutable engine state.
    #[test]
    fn objective_trait_object_builds() {
        fn _evaluate(
            objective: &dyn domain::Objective,
            params: &domain::ParameterSet,
        ) -> Result<domain::ObjectiveResult, domain::EvaluationError> {
            objective.evaluate(params)
        }
    }
}
