//! Parameter optimizer — searches a [`ParameterSpace`] for the best-scoring set.
//!
//! Methods:
//! - `grid`: Cartesian product of each dimension's grid values
//! - `random`: uniform samples from the space
//! - `genetic`: tournament selection, uniform crossover, per-gene mutation, elitism
//! - `particle_swarm`: inertia / cognitive / social velocity updates on the axis
//!   representation of the space
//! - `bayesian`: Gaussian-process surrogate with expected improvement
//!
//! Every evaluation lands in `history` in submission order, successful or not.
//! An objective that errors, panics or returns a non-finite score is recorded
//! with a score of `-inf` and the search continues. Equal scores resolve to
//! the earlier submission. Cancellation and timeouts stop the search between
//! evaluations and return the best result so far with a flag set.

pub mod bayesian;
pub mod genetic;
pub mod gp;
pub mod grid;
pub mod random;
pub mod swarm;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use stratguard_core::cancel::{RunControl, StopReason};
use stratguard_core::domain::{Objective, ObjectiveResult, ParameterSet, ParameterSpace};
use stratguard_core::error::ErrorKind;
use stratguard_core::rng::RngHierarchy;

use crate::fitness::FitnessMetric;

/// Grid and random searches evaluate in chunks of this many candidates so that
/// progress is reported while a large batch runs.
const BATCH_CHUNK: usize = 256;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    #[default]
    Grid,
    Random,
    Genetic,
    ParticleSwarm,
    Bayesian,
}

impl OptimizationMethod {
    pub const ALL: [OptimizationMethod; 5] = [
        OptimizationMethod::Grid,
        OptimizationMethod::Random,
        OptimizationMethod::Genetic,
        OptimizationMethod::ParticleSwarm,
        OptimizationMethod::Bayesian,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OptimizationMethod::Grid => "grid",
            OptimizationMethod::Random => "random",
            OptimizationMethod::Genetic => "genetic",
            OptimizationMethod::ParticleSwarm => "particle_swarm",
            OptimizationMethod::Bayesian => "bayesian",
        }
    }
}

impl std::fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for OptimizationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "pso" | "swarm" => Ok(OptimizationMethod::ParticleSwarm),
            "bo" => Ok(OptimizationMethod::Bayesian),
            "ga" => Ok(OptimizationMethod::Genetic),
            other => OptimizationMethod::ALL
                .into_iter()
                .find(|m| m.name() == other)
                .ok_or_else(|| {
                    format!(
                        "unknown method '{s}' (expected one of grid, random, genetic, particle_swarm, bayesian)"
                    )
                }),
        }
    }
}

/// Optimizer configuration. Fields unused by the selected method are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Search method (default grid).
    pub method: OptimizationMethod,
    /// Which value ranks candidates (default the objective score).
    pub fitness: FitnessMetric,
    /// Random: samples. Genetic / swarm: generations. Bayesian: total
    /// evaluations (default 100).
    pub max_iterations: usize,
    /// Grid points per continuous dimension (default 10).
    pub grid_steps: usize,
    /// Largest grid accepted before failing with `GridTooLarge` (default 1,000,000).
    pub max_grid_size: usize,
    /// Genetic population / swarm size (default 50).
    pub population_size: usize,
    /// Per-pair crossover probability (default 0.8).
    pub crossover_rate: f64,
    /// Per-gene mutation probability (default 0.1).
    pub mutation_rate: f64,
    /// Gaussian mutation σ as a fraction of the dimension's range (default 0.1).
    pub mutation_scale: f64,
    /// Tournament size for parent selection (default 3).
    pub tournament_size: usize,
    /// Generations (or swarm steps) without improvement before stopping;
    /// 0 disables the check (default 20).
    pub patience: usize,
    /// Swarm inertia weight `w` (default 0.7).
    pub inertia: f64,
    /// Swarm cognitive coefficient `c1` (default 1.5).
    pub cognitive: f64,
    /// Swarm social coefficient `c2` (default 1.5).
    pub social: f64,
    /// Velocity clamp as a fraction of each axis width (default 0.2).
    pub v_max_fraction: f64,
    /// Bayesian: random evaluations before the surrogate takes over (default 10).
    pub initial_samples: usize,
    /// Bayesian: random candidates scored by the acquisition function per step (default 1,000).
    pub candidate_pool: usize,
    /// Bayesian: expected-improvement exploration margin `xi` (default 0.01).
    pub xi: f64,
    /// Bayesian: kernel length scale on the unit cube (default 0.2).
    pub length_scale: f64,
    /// Bayesian: observation noise added to the kernel diagonal (default 1e-6).
    pub noise: f64,
    /// Master seed (default 42).
    pub seed: u64,
    /// Evaluate batches on the rayon pool (default true).
    pub parallel: bool,
    /// Wall-clock budget in milliseconds (default none).
    pub timeout_ms: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            method: OptimizationMethod::Grid,
            fitness: FitnessMetric::Score,
            max_iterations: 100,
            grid_steps: 10,
            max_grid_size: 1_000_000,
            population_size: 50,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            mutation_scale: 0.1,
            tournament_size: 3,
            patience: 20,
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
            v_max_fraction: 0.2,
            initial_samples: 10,
            candidate_pool: 1_000,
            xi: 0.01,
            length_scale: 0.2,
            noise: 1e-6,
            seed: 42,
            parallel: true,
            timeout_ms: None,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), OptimizeError> {
        let rate = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(OptimizeError::InvalidConfig(format!("{name} must be in [0, 1], got {v}")))
            }
        };
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(OptimizeError::InvalidConfig(format!("{name} must be >= 0, got {v}")))
            }
        };
        rate("crossover_rate", self.crossover_rate)?;
        rate("mutation_rate", self.mutation_rate)?;
        non_negative("mutation_scale", self.mutation_scale)?;
        non_negative("inertia", self.inertia)?;
        non_negative("cognitive", self.cognitive)?;
        non_negative("social", self.social)?;
        non_negative("xi", self.xi)?;
        non_negative("noise", self.noise)?;
        if !(self.v_max_fraction.is_finite() && self.v_max_fraction > 0.0) {
            return Err(OptimizeError::InvalidConfig("v_max_fraction must be > 0".into()));
        }
        if !(self.length_scale.is_finite() && self.length_scale > 0.0) {
            return Err(OptimizeError::InvalidConfig("length_scale must be > 0".into()));
        }
        match self.method {
            OptimizationMethod::Grid if self.grid_steps == 0 => {
                Err(OptimizeError::InvalidConfig("grid_steps must be > 0".into()))
            }
            OptimizationMethod::Random | OptimizationMethod::Bayesian
                if self.max_iterations == 0 =>
            {
                Err(OptimizeError::InvalidConfig("max_iterations must be > 0".into()))
            }
            OptimizationMethod::Genetic | OptimizationMethod::ParticleSwarm
                if self.population_size < 2 =>
            {
                Err(OptimizeError::InvalidConfig("population_size must be >= 2".into()))
            }
            OptimizationMethod::Genetic if self.tournament_size == 0 => {
                Err(OptimizeError::InvalidConfig("tournament_size must be > 0".into()))
            }
            OptimizationMethod::Bayesian if self.candidate_pool == 0 => {
                Err(OptimizeError::InvalidConfig("candidate_pool must be > 0".into()))
            }
            _ => Ok(()),
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// One objective evaluation, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Submission order, starting at 0.
    pub index: usize,
    /// Generation / step / round the evaluation belongs to.
    pub iteration: usize,
    pub parameters: ParameterSet,
    /// Objective score; `-inf` for failed evaluations.
    pub score: f64,
    /// Ranking value under the configured fitness metric; `-inf` for failures.
    pub fitness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ObjectiveResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.fitness.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub method: OptimizationMethod,
    pub fitness: FitnessMetric,
    pub best_parameters: Option<ParameterSet>,
    /// Ranking value of the best evaluation; `-inf` when nothing succeeded.
    pub best_score: f64,
    pub best_index: Option<usize>,
    pub best_result: Option<ObjectiveResult>,
    pub history: Vec<EvaluationRecord>,
    /// Iteration at which the best evaluation was submitted.
    pub converged_at: Option<usize>,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub cancelled: bool,
    pub seed: u64,
}

impl OptimizationResult {
    /// The `k` best distinct parameter sets, best first (ties by index).
    pub fn top_k(&self, k: usize) -> Vec<&EvaluationRecord> {
        let mut ranked: Vec<&EvaluationRecord> =
            self.history.iter().filter(|r| r.is_success()).collect();
        ranked.sort_by(|a, b| b.fitness.total_cmp(&a.fitness).then(a.index.cmp(&b.index)));
        let mut seen = std::collections::HashSet::new();
        ranked
            .into_iter()
            .filter(|r| seen.insert(r.parameters.fingerprint()))
            .take(k)
            .collect()
    }

    pub fn stopped_early(&self) -> bool {
        self.timed_out || self.cancelled
    }
}

/// Progress message sent through [`RunControl::progress`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerProgress {
    pub method: OptimizationMethod,
    pub iteration: usize,
    pub evaluations: usize,
    /// Planned evaluations when known up front (grid, random, bayesian).
    pub planned: Option<usize>,
    pub best_score: Option<f64>,
    pub elapsed_ms: u64,
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("grid of {size} points exceeds the limit of {limit}")]
    GridTooLarge { size: String, limit: usize },
    #[error("invalid optimizer configuration: {0}")]
    InvalidConfig(String),
}

impl OptimizeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}

// ─── Optimizer ───────────────────────────────────────────────────────

pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self, OptimizeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Search `space` for the set that maximizes the configured fitness.
    ///
    /// Structural problems (an oversized grid) fail before any evaluation;
    /// everything after that is absorbed into the result.
    pub fn optimize(
        &self,
        space: &ParameterSpace,
        objective: &dyn Objective,
        control: &RunControl<OptimizerProgress>,
    ) -> Result<OptimizationResult, OptimizeError> {
        let cfg = &self.config;
        let control = control.tightened(cfg.timeout_ms.map(Duration::from_millis));
        let mut search = Search::new(space, objective, &control, cfg);
        debug!(method = %cfg.method, dims = space.len(), seed = cfg.seed, "optimization started");

        match cfg.method {
            OptimizationMethod::Grid => grid::run(&mut search, cfg)?,
            OptimizationMethod::Random => random::run(&mut search, cfg),
            OptimizationMethod::Genetic => genetic::run(&mut search, cfg),
            OptimizationMethod::ParticleSwarm => swarm::run(&mut search, cfg),
            OptimizationMethod::Bayesian => bayesian::run(&mut search, cfg),
        }

        let result = search.finish();
        info!(
            method = %result.method,
            evaluations = result.evaluations,
            failed = result.failed_evaluations,
            best_score = result.best_score,
            elapsed_ms = result.elapsed_ms,
            timed_out = result.timed_out,
            cancelled = result.cancelled,
            "optimization finished"
        );
        Ok(result)
    }
}

// ─── Search state ────────────────────────────────────────────────────

/// Shared bookkeeping for every method: history, stop checks, progress.
pub(crate) struct Search<'a> {
    pub space: &'a ParameterSpace,
    objective: &'a dyn Objective,
    control: &'a RunControl<OptimizerProgress>,
    pub hierarchy: RngHierarchy,
    method: OptimizationMethod,
    fitness: FitnessMetric,
    parallel: bool,
    planned: Option<usize>,
    history: Vec<EvaluationRecord>,
    best: Option<(f64, usize)>,
    stop: Option<StopReason>,
    started: Instant,
    seed: u64,
}

impl<'a> Search<'a> {
    fn new(
        space: &'a ParameterSpace,
        objective: &'a dyn Objective,
        control: &'a RunControl<OptimizerProgress>,
        cfg: &OptimizerConfig,
    ) -> Self {
        Self {
            space,
            objective,
            control,
            hierarchy: RngHierarchy::new(cfg.seed),
            method: cfg.method,
            fitness: cfg.fitness,
            parallel: cfg.parallel,
            planned: None,
            history: Vec::new(),
            best: None,
            stop: None,
            started: Instant::now(),
            seed: cfg.seed,
        }
    }

    pub fn set_planned(&mut self, planned: usize) {
        self.planned = Some(planned);
    }

    /// Check (and latch) cancellation / timeout.
    pub fn stopped(&mut self) -> bool {
        if self.stop.is_none() {
            self.stop = self.control.stop_reason();
        }
        self.stop.is_some()
    }

    pub fn evaluations(&self) -> usize {
        self.history.len()
    }

    pub fn history(&self) -> &[EvaluationRecord] {
        &self.history
    }

    /// Best fitness so far, if any evaluation succeeded.
    pub fn best_fitness(&self) -> Option<f64> {
        self.best.map(|(f, _)| f)
    }

    /// Evaluate `candidates` (in parallel when enabled) and append them to the
    /// history in submission order.
    ///
    /// Returns one fitness per candidate; `None` marks candidates skipped
    /// because the run was stopped.
    pub fn evaluate_batch(&mut self, candidates: &[ParameterSet], iteration: usize) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(candidates.len());
        for chunk in candidates.chunks(BATCH_CHUNK) {
            if self.stopped() {
                out.extend(std::iter::repeat(None).take(chunk.len()));
                continue;
            }
            let objective = self.objective;
            let control = self.control;
            let fitness = self.fitness;
            let outcomes: Vec<Option<Outcome>> = if self.parallel {
                chunk
                    .par_iter()
                    .map(|p| (!control.should_stop()).then(|| evaluate_one(objective, fitness, p)))
                    .collect()
            } else {
                chunk
                    .iter()
                    .map(|p| (!control.should_stop()).then(|| evaluate_one(objective, fitness, p)))
                    .collect()
            };
            let skipped = outcomes.iter().any(Option::is_none);
            for (params, outcome) in chunk.iter().zip(outcomes) {
                out.push(outcome.map(|o| self.record(params.clone(), iteration, o)));
            }
            if skipped {
                self.stopped();
            }
            self.report(iteration);
        }
        out
    }

    /// Evaluate one candidate on the calling thread.
    pub fn evaluate(&mut self, params: &ParameterSet, iteration: usize) -> Option<f64> {
        if self.stopped() {
            return None;
        }
        let outcome = evaluate_one(self.objective, self.fitness, params);
        let fitness = self.record(params.clone(), iteration, outcome);
        self.report(iteration);
        Some(fitness)
    }

    fn record(&mut self, parameters: ParameterSet, iteration: usize, outcome: Outcome) -> f64 {
        let index = self.history.len();
        if let Some(err) = &outcome.error {
            warn!(index, %parameters, error = %err, "evaluation failed");
        }
        let fitness = outcome.fitness;
        // Strictly greater: the earlier submission keeps ties.
        if fitness.is_finite() && self.best.map_or(true, |(b, _)| fitness > b) {
            self.best = Some((fitness, index));
        }
        self.history.push(EvaluationRecord {
            index,
            iteration,
            parameters,
            score: outcome.score,
            fitness,
            result: outcome.result,
            error: outcome.error,
        });
        fitness
    }

    fn report(&self, iteration: usize) {
        self.control.report(OptimizerProgress {
            method: self.method,
            iteration,
            evaluations: self.history.len(),
            planned: self.planned,
            best_score: self.best_fitness(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        });
    }

    fn finish(self) -> OptimizationResult {
        // Re-derive the winner from the full history (max fitness, lowest index).
        let best = self
            .history
            .iter()
            .filter(|r| r.is_success())
            .min_by(|a, b| b.fitness.total_cmp(&a.fitness).then(a.index.cmp(&b.index)));
        let failed = self.history.iter().filter(|r| !r.is_success()).count();

        OptimizationResult {
            method: self.method,
            fitness: self.fitness,
            best_parameters: best.map(|r| r.parameters.clone()),
            best_score: best.map_or(f64::NEG_INFINITY, |r| r.fitness),
            best_index: best.map(|r| r.index),
            best_result: best.and_then(|r| r.result.clone()),
            converged_at: best.map(|r| r.iteration),
            evaluations: self.history.len(),
            failed_evaluations: failed,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            timed_out: self.stop == Some(StopReason::TimedOut),
            cancelled: self.stop == Some(StopReason::Cancelled),
            seed: self.seed,
            history: self.history,
        }
    }
}

struct Outcome {
    score: f64,
    fitness: f64,
    result: Option<ObjectiveResult>,
    error: Option<String>,
}

/// Run the objective, turning errors, panics and non-finite values into a
/// `-inf` outcome.
fn evaluate_one(objective: &dyn Objective, fitness: FitnessMetric, params: &ParameterSet) -> Outcome {
    let failed = |error: String, result: Option<ObjectiveResult>| Outcome {
        score: result.as_ref().map_or(f64::NEG_INFINITY, |r| {
            if r.score.is_finite() {
                r.score
            } else {
                f64::NEG_INFINITY
            }
        }),
        fitness: f64::NEG_INFINITY,
        result,
        error: Some(error),
    };

    match catch_unwind(AssertUnwindSafe(|| objective.evaluate(params))) {
        Ok(Ok(result)) => {
            let value = fitness.extract(&result);
            if !result.score.is_finite() {
                failed(format!("non-finite score {}", result.score), Some(result))
            } else if !value.is_finite() {
                failed(format!("non-finite {fitness} value {value}"), Some(result))
            } else {
                Outcome {
                    score: result.score,
                    fitness: value,
                    result: Some(result),
                    error: None,
                }
            }
        }
        Ok(Err(e)) => failed(e.to_string(), None),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            failed(format!("objective panicked: {message}"), None)
        }
    }
}
