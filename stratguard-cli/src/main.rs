//! StratGuard CLI — optimize, stress-test and split commands.
//!
//! Commands:
//! - `optimize` — search a built-in strategy's parameters over a bar CSV,
//!   optionally through the full walk-forward validation pipeline
//! - `stress-test` — scenario + Monte Carlo stress test of a portfolio file
//! - `split` — print the train / validation / test windows for a series length
//!
//! Exit code 0 on success, 2 for insufficient data or an invalid parameter
//! space, 1 for everything else.

mod data;
mod portfolio_file;
mod strategies;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use stratguard_core::cancel::RunControl;
use stratguard_core::correlation::{CorrelationError, CorrelationManager, RiskAlert};
use stratguard_core::domain::{SpaceError, Windowed};
use stratguard_core::split::{SplitError, SplitMode, TimeSeriesSplitter};
use stratguard_core::stress::{MonteCarloSummary, StressError, StressResult, StressTestEngine};
use stratguard_core::ErrorKind;
use stratguard_runner::{
    validate_strategy, ConfigError, EngineConfig, OptimizationMethod, OptimizationResult, OptimizeError,
    Optimizer, OptimizerProgress, OverfittingError, ValidationError, ValidationReport,
};

use data::DataError;
use portfolio_file::PortfolioFile;
use strategies::{Strategy, StrategyKind};

#[derive(Parser)]
#[command(
    name = "stratguard",
    about = "StratGuard — strategy optimization and risk validation engine"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG still wins when set).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a built-in strategy's parameters over a bar CSV.
    Optimize {
        /// Strategy: ma_crossover, breakout.
        strategy: StrategyKind,

        /// Bar CSV (timestamp,open,high,low,close,volume).
        #[arg(long)]
        data: PathBuf,

        /// Search method: grid, random, genetic, particle_swarm, bayesian.
        #[arg(long)]
        method: Option<OptimizationMethod>,

        /// Evaluation / generation budget.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Engine TOML config; flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Master seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Wall-clock budget per optimization run.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Run walk-forward validation with overfitting detection instead of
        /// a single in-sample optimization.
        #[arg(long, default_value_t = false)]
        validate: bool,

        /// Print the full result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Stress-test a portfolio file (TOML or JSON).
    StressTest {
        portfolio: PathBuf,

        /// Monte Carlo paths.
        #[arg(long)]
        simulations: Option<usize>,

        /// Monte Carlo horizon in periods.
        #[arg(long)]
        horizon: Option<usize>,

        /// VaR confidence level, e.g. 0.95.
        #[arg(long)]
        confidence: Option<f64>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the split windows for a series of `len` bars.
    Split {
        /// Series length in bars.
        #[arg(long)]
        len: usize,

        /// Engine TOML config whose [split] section is used; flags are ignored.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = SplitKind::WalkForward)]
        mode: SplitKind,

        /// Walk-forward train window.
        #[arg(long, default_value_t = 252)]
        train: usize,

        /// Walk-forward validation window (0 for none).
        #[arg(long, default_value_t = 63)]
        validation: usize,

        /// Walk-forward test window.
        #[arg(long, default_value_t = 63)]
        test: usize,

        /// Walk-forward step.
        #[arg(long, default_value_t = 63)]
        step: usize,

        /// K-fold block count.
        #[arg(long, default_value_t = 5)]
        k: usize,

        /// K-fold validation tail fraction.
        #[arg(long, default_value_t = 0.0)]
        validation_fraction: f64,

        /// Expanding fold count.
        #[arg(long, default_value_t = 3)]
        folds: usize,

        /// Expanding minimum train window.
        #[arg(long, default_value_t = 252)]
        min_train: usize,

        /// Expanding minimum test window.
        #[arg(long, default_value_t = 63)]
        min_test: usize,

        /// Bars dropped between partitions.
        #[arg(long, default_value_t = 5)]
        purge: usize,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SplitKind {
    WalkForward,
    KFold,
    Expanding,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Optimize {
            strategy,
            data,
            method,
            max_iterations,
            config,
            seed,
            timeout_secs,
            validate,
            json,
        } => {
            let mut engine = match &config {
                Some(path) => EngineConfig::from_file(path)?,
                None => EngineConfig::default(),
            };
            if let Some(m) = method {
                engine.optimizer.method = m;
            }
            if let Some(n) = max_iterations {
                engine.optimizer.max_iterations = n;
            }
            if let Some(s) = seed {
                engine.optimizer.seed = s;
            }
            if let Some(secs) = timeout_secs {
                engine.optimizer.timeout_ms = Some(secs.saturating_mul(1_000));
            }
            run_optimize(strategy, &data, &engine, validate, json)
        }
        Commands::StressTest {
            portfolio,
            simulations,
            horizon,
            confidence,
            seed,
            json,
        } => {
            let mut file = PortfolioFile::from_file(&portfolio)?;
            if let Some(n) = simulations {
                file.monte_carlo.num_simulations = n;
            }
            if let Some(h) = horizon {
                file.monte_carlo.time_horizon = h;
            }
            if let Some(c) = confidence {
                file.monte_carlo.confidence_level = c;
            }
            if let Some(s) = seed {
                file.monte_carlo.seed = s;
            }
            run_stress_test(&file, json)
        }
        Commands::Split {
            len,
            config,
            mode,
            train,
            validation,
            test,
            step,
            k,
            validation_fraction,
            folds,
            min_train,
            min_test,
            purge,
            json,
        } => {
            let split_mode = match &config {
                Some(path) => EngineConfig::from_file(path)?.split,
                None => match mode {
                    SplitKind::WalkForward => SplitMode::WalkForward {
                        train_window: train,
                        validation_window: validation,
                        test_window: test,
                        step_size: step,
                        purge_gap: purge,
                    },
                    SplitKind::KFold => SplitMode::KFold {
                        k,
                        purge_gap: purge,
                        validation_fraction,
                    },
                    SplitKind::Expanding => SplitMode::Expanding {
                        n_folds: folds,
                        min_train,
                        min_test,
                        purge_gap: purge,
                    },
                },
            };
            run_split(len, &split_mode, json)
        }
    }
}

// ─── optimize ────────────────────────────────────────────────────────

fn run_optimize(
    kind: StrategyKind,
    data_path: &std::path::Path,
    engine: &EngineConfig,
    validate: bool,
    json: bool,
) -> Result<()> {
    let bars = data::load_bars(data_path)?;
    let strategy = Strategy::new(kind, &bars);
    let space = kind.space()?;
    info!(
        strategy = %kind,
        bars = bars.len(),
        method = %engine.optimizer.method,
        validate,
        "optimize started"
    );

    let (tx, rx) = mpsc::channel();
    let logger = spawn_progress_logger(rx);
    let control = RunControl::new().with_progress(tx);

    if validate {
        let report = validate_strategy(&space, &strategy, strategy.len(), &engine.validation_config(), &control)?;
        drop(control);
        let _ = logger.join();
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_validation(kind, &report);
        }
    } else {
        let objective = Windowed::new(&strategy, strategy.full_window());
        let result = Optimizer::new(engine.optimizer.clone())?.optimize(&space, &objective, &control)?;
        drop(control);
        let _ = logger.join();
        if json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_optimization(kind, &result);
        }
    }
    Ok(())
}

/// Log progress at debug level whenever the iteration advances. Ends when
/// every sender is dropped.
fn spawn_progress_logger(rx: Receiver<OptimizerProgress>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut last_iteration = None;
        for p in rx {
            if last_iteration == Some(p.iteration) {
                continue;
            }
            last_iteration = Some(p.iteration);
            debug!(
                method = %p.method,
                iteration = p.iteration,
                evaluations = p.evaluations,
                planned = ?p.planned,
                best = ?p.best_score,
                elapsed_ms = p.elapsed_ms,
                "progress"
            );
        }
    })
}

fn print_optimization(kind: StrategyKind, result: &OptimizationResult) {
    println!();
    println!("=== Optimization Result ===");
    println!("Strategy:       {kind}");
    println!("Method:         {}", result.method);
    println!("Fitness:        {}", result.fitness);
    println!(
        "Evaluations:    {} ({} failed)",
        result.evaluations, result.failed_evaluations
    );
    println!("Elapsed:        {} ms", result.elapsed_ms);
    println!();
    match &result.best_parameters {
        Some(best) => {
            println!("Best score:     {:.4}", result.best_score);
            println!("Best params:    {best}");
            if let Some(iter) = result.converged_at {
                println!("Found at iter:  {iter}");
            }
            if let Some(m) = result.best_result.as_ref().map(|r| &r.metrics) {
                println!();
                println!("--- In-sample metrics ---");
                println!("Total Return:   {:.2}%", m.total_return * 100.0);
                println!("Sharpe:         {:.3}", m.sharpe);
                println!("Sortino:        {:.3}", m.sortino);
                println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
                println!("Trades:         {}", m.trade_count);
                println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
            }
            println!();
            println!("--- Top candidates ---");
            for r in result.top_k(5) {
                println!("#{:<5} {:>10.4}  {}", r.index, r.fitness, r.parameters);
            }
        }
        None => println!("No successful evaluation."),
    }
    if result.timed_out {
        println!();
        println!("WARNING: stopped at the time limit; best-so-far shown");
    }
    if result.cancelled {
        println!();
        println!("WARNING: cancelled; best-so-far shown");
    }
    println!();
}

fn print_validation(kind: StrategyKind, report: &ValidationReport) {
    println!();
    println!("=== Walk-Forward Validation ===");
    println!("Strategy:       {kind}");
    println!("Folds:          {} ({} skipped)", report.folds.len(), report.skipped_folds.len());
    println!();
    println!(
        "{:<5} {:<13} {:<13} {:>9} {:>9} {:>9} {:>7} {:<9} {}",
        "Fold", "Train", "Test", "Train", "Valid", "Test", "Risk", "Severity", "Params"
    );
    println!("{}", "-".repeat(96));
    for f in &report.folds {
        println!(
            "{:<5} {:<13} {:<13} {:>9.3} {:>9.3} {:>9.3} {:>7.3} {:<9} {}",
            f.fold,
            format!("{}..{}", f.train.start, f.train.end),
            format!("{}..{}", f.test.start, f.test.end),
            f.train_score,
            f.validation_score,
            f.test_score,
            f.overfitting.overfitting_score,
            f.overfitting.severity,
            f.parameters
        );
    }
    println!();
    println!("Mean train:     {:.4}", report.mean_train_score);
    println!("Mean valid:     {:.4}", report.mean_validation_score);
    println!("Mean test:      {:.4}", report.mean_test_score);
    match report.degradation_ratio {
        Some(r) => println!("Test/train:     {r:.3} ({:?})", report.degradation_flag),
        None => println!("Test/train:     n/a ({:?})", report.degradation_flag),
    }
    if let Some(t) = &report.t_test {
        println!("t-test:         t = {:.3}, p = {:.4}", t.t_statistic, t.p_value);
    }
    println!("Pass rate:      {:.0}%", report.pass_rate * 100.0);
    println!("Verdict:        {}", if report.passed() { "PASS" } else { "FAIL" });

    let mut recommendations: Vec<&str> = report
        .folds
        .iter()
        .flat_map(|f| f.overfitting.recommendations.iter().map(String::as_str))
        .collect();
    recommendations.sort_unstable();
    recommendations.dedup();
    if !recommendations.is_empty() {
        println!();
        println!("--- Recommendations ---");
        for r in recommendations {
            println!("- {r}");
        }
    }
    if report.timed_out || report.cancelled {
        println!();
        println!("WARNING: validation stopped early; later folds are missing");
    }
    println!();
}

// ─── stress-test ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StressReport {
    portfolio_value: f64,
    /// One-period portfolio volatility from the return histories.
    volatility: f64,
    scenarios: Vec<StressResult>,
    monte_carlo: MonteCarloSummary,
    alerts: Vec<RiskAlert>,
}

fn stress_report(file: &PortfolioFile) -> Result<StressReport> {
    let snapshot = file.snapshot();
    let engine = StressTestEngine::from_prices(file.stress.clone(), &file.prices);

    let scenarios = engine.run_multiple_scenarios(&snapshot);
    let monte_carlo = engine.run_monte_carlo(&snapshot, &file.monte_carlo, &RunControl::new())?;

    let mut correlation = CorrelationManager::new(file.correlation.clone());
    for (symbol, prices) in &file.prices {
        correlation.update_history(symbol, prices)?;
    }
    let alerts = correlation.assess(&snapshot);

    Ok(StressReport {
        portfolio_value: snapshot.total_value,
        volatility: engine.portfolio_volatility(&snapshot),
        scenarios,
        monte_carlo,
        alerts,
    })
}

fn run_stress_test(file: &PortfolioFile, json: bool) -> Result<()> {
    let report = stress_report(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("=== Stress Test ===");
    println!("Portfolio value: {:.2}", report.portfolio_value);
    println!("Volatility:      {:.2}% per period", report.volatility * 100.0);
    println!();
    println!(
        "{:<22} {:>10} {:>9} {:>9}  {}",
        "Scenario", "Impact", "VaR95", "CVaR95", "Worst position"
    );
    println!("{}", "-".repeat(72));
    for s in &report.scenarios {
        let worst = s
            .worst_position
            .as_ref()
            .map_or_else(|| "-".to_string(), |w| format!("{} ({:.2})", w.symbol, w.pnl));
        println!(
            "{:<22} {:>9.2}% {:>8.2}% {:>8.2}%  {}",
            s.scenario, s.portfolio_impact_pct, s.var95, s.cvar95, worst
        );
    }

    let mc = &report.monte_carlo;
    println!();
    println!("--- Monte Carlo ---");
    println!("Paths:           {}", mc.simulations_run);
    println!("Confidence:      {:.1}%", mc.confidence_level * 100.0);
    println!("VaR:             {:.2}%", mc.var);
    println!("CVaR:            {:.2}%", mc.cvar);
    println!("Expected return: {:.2}%", mc.expected_return_pct);
    for p in &mc.distribution {
        println!("  p{:<5} {:>8.2}%", p.percentile, p.return_pct);
    }
    if !mc.symbols_without_history.is_empty() {
        println!("No history (held flat): {}", mc.symbols_without_history.join(", "));
    }
    if mc.timed_out || mc.cancelled {
        println!("WARNING: simulation stopped early");
    }

    if !report.alerts.is_empty() {
        println!();
        println!("--- Alerts ---");
        for a in &report.alerts {
            println!("[{:?}] {}", a.severity, a.message);
        }
    }
    println!();
    Ok(())
}

// ─── split ───────────────────────────────────────────────────────────

fn run_split(len: usize, mode: &SplitMode, json: bool) -> Result<()> {
    let splits = TimeSeriesSplitter::split(len, mode)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&splits)?);
        return Ok(());
    }
    println!("{:<5} {:<13} {:<13} {:<13}", "Fold", "Train", "Validation", "Test");
    println!("{}", "-".repeat(46));
    let range = |r: stratguard_core::split::IndexRange| {
        if r.is_empty() {
            "-".to_string()
        } else {
            format!("{}..{}", r.start, r.end)
        }
    };
    for s in &splits {
        println!(
            "{:<5} {:<13} {:<13} {:<13}",
            s.fold,
            range(s.train),
            range(s.validation),
            range(s.test)
        );
    }
    Ok(())
}

// ─── Exit codes ──────────────────────────────────────────────────────

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.chain().find_map(error_kind) {
        Some(kind) if kind.is_input_error() => 2,
        _ => 1,
    }
}

fn error_kind(err: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    if let Some(e) = err.downcast_ref::<SplitError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<SpaceError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<OptimizeError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<ValidationError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<OverfittingError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<StressError>() {
        return Some(e.kind());
    }
    if let Some(e) = err.downcast_ref::<CorrelationError>() {
        return Some(e.kind());
    }
    err.downcast_ref::<DataError>().map(DataError::kind)
}
