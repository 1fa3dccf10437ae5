//! Built-in demonstration strategies.
//!
//! The engine never backtests; these give the CLI something to optimize.
//! Both are long/flat (or long/short) signal rules over closing prices,
//! scored on a window of the bar series:
//!
//! - `ma_crossover` — long while the fast SMA is above the slow SMA
//! - `breakout` — Donchian channel entry with a shorter exit channel
//!
//! Signals at bar `t` only look at bars `<= t` and are applied to the
//! return from `t` to `t + 1`. Bars before the window may seed indicators.

use std::fmt;
use std::str::FromStr;

use stratguard_core::domain::{
    Bar, EvaluationError, ObjectiveResult, ParameterSet, ParameterSpace, ParameterSpec, SpaceError,
    WindowObjective,
};
use stratguard_core::metrics::StrategyMetrics;
use stratguard_core::split::IndexRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MaCrossover,
    Breakout,
}

impl StrategyKind {
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::MaCrossover => "ma_crossover",
            StrategyKind::Breakout => "breakout",
        }
    }

    /// Search space of the strategy's parameters.
    pub fn space(self) -> Result<ParameterSpace, SpaceError> {
        match self {
            StrategyKind::MaCrossover => ParameterSpace::new(vec![
                ParameterSpec::discrete("fast", 2.0, 50.0, 1.0),
                ParameterSpec::discrete("slow", 10.0, 200.0, 5.0),
            ]),
            StrategyKind::Breakout => ParameterSpace::new(vec![
                ParameterSpec::discrete("entry", 10.0, 100.0, 5.0),
                ParameterSpec::discrete("exit", 5.0, 50.0, 5.0),
                ParameterSpec::categorical("direction", ["long_only", "long_short"]),
            ]),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ma_crossover" | "sma" => Ok(StrategyKind::MaCrossover),
            "breakout" | "donchian" => Ok(StrategyKind::Breakout),
            _ => Err(format!("unknown strategy '{s}'. Valid: ma_crossover, breakout")),
        }
    }
}

/// A strategy bound to a bar series.
pub struct Strategy {
    kind: StrategyKind,
    closes: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
}

impl Strategy {
    pub fn new(kind: StrategyKind, bars: &[Bar]) -> Self {
        Self {
            kind,
            closes: bars.iter().map(|b| b.close).collect(),
            highs: bars.iter().map(|b| b.high).collect(),
            lows: bars.iter().map(|b| b.low).collect(),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    /// The whole series as one window.
    pub fn full_window(&self) -> IndexRange {
        IndexRange::new(0, self.len())
    }

    /// Position held from bar `t` to `t + 1`, for `t < end`.
    fn positions(&self, params: &ParameterSet, end: usize) -> Result<Vec<f64>, EvaluationError> {
        match self.kind {
            StrategyKind::MaCrossover => {
                let fast = lookback(params, "fast")?;
                let slow = lookback(params, "slow")?;
                if fast >= slow {
                    return Err(EvaluationError::new(format!(
                        "fast period {fast} must be below slow period {slow}"
                    )));
                }
                Ok(ma_crossover(&self.closes[..end], fast, slow))
            }
            StrategyKind::Breakout => {
                let entry = lookback(params, "entry")?;
                let exit = lookback(params, "exit")?;
                let short = match params.choice("direction") {
                    Some("long_short") => true,
                    Some("long_only") => false,
                    other => {
                        return Err(EvaluationError::new(format!("unknown direction {other:?}")));
                    }
                };
                Ok(breakout(
                    &self.closes[..end],
                    &self.highs[..end],
                    &self.lows[..end],
                    entry,
                    exit,
                    short,
                ))
            }
        }
    }
}

impl WindowObjective for Strategy {
    fn evaluate_window(
        &self,
        params: &ParameterSet,
        window: IndexRange,
    ) -> Result<ObjectiveResult, EvaluationError> {
        if window.end > self.len() || window.len() < 2 {
            return Err(EvaluationError::new(format!(
                "window {}..{} does not fit {} bars",
                window.start,
                window.end,
                self.len()
            )));
        }
        let positions = self.positions(params, window.end)?;
        let run = simulate(&self.closes, &positions, window);
        let metrics = StrategyMetrics::compute(&run.equity, &run.trade_pnls);
        Ok(ObjectiveResult::with_metrics(metrics.sharpe, metrics).with_returns(run.returns))
    }
}

fn lookback(params: &ParameterSet, name: &str) -> Result<usize, EvaluationError> {
    params
        .number(name)
        .filter(|v| *v >= 1.0)
        .map(|v| v as usize)
        .ok_or_else(|| EvaluationError::new(format!("missing or invalid '{name}'")))
}

// ── Signals ──

fn ma_crossover(closes: &[f64], fast: usize, slow: usize) -> Vec<f64> {
    let fast_ma = sma(closes, fast);
    let slow_ma = sma(closes, slow);
    fast_ma
        .iter()
        .zip(&slow_ma)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) if f > s => 1.0,
            _ => 0.0,
        })
        .collect()
}

fn breakout(closes: &[f64], highs: &[f64], lows: &[f64], entry: usize, exit: usize, short: bool) -> Vec<f64> {
    let mut positions = vec![0.0; closes.len()];
    let mut pos = 0.0;
    for t in 0..closes.len() {
        let c = closes[t];
        // Channels over the bars before t.
        let entry_hi = channel_max(highs, t, entry);
        let entry_lo = channel_min(lows, t, entry);
        let exit_hi = channel_max(highs, t, exit);
        let exit_lo = channel_min(lows, t, exit);

        if pos > 0.0 && exit_lo.is_some_and(|lo| c < lo) {
            pos = 0.0;
        } else if pos < 0.0 && exit_hi.is_some_and(|hi| c > hi) {
            pos = 0.0;
        }
        if pos == 0.0 {
            if entry_hi.is_some_and(|hi| c > hi) {
                pos = 1.0;
            } else if short && entry_lo.is_some_and(|lo| c < lo) {
                pos = -1.0;
            }
        }
        positions[t] = pos;
    }
    positions
}

/// Simple moving average ending at each bar; `None` during warmup.
fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        if i + 1 >= period {
            out[i] = Some(sum / period as f64);
        }
    }
    out
}

fn channel_max(values: &[f64], t: usize, period: usize) -> Option<f64> {
    (t >= period).then(|| values[t - period..t].iter().copied().fold(f64::NEG_INFINITY, f64::max))
}

fn channel_min(values: &[f64], t: usize, period: usize) -> Option<f64> {
    (t >= period).then(|| values[t - period..t].iter().copied().fold(f64::INFINITY, f64::min))
}

// ── Simulation ──

struct Run {
    equity: Vec<f64>,
    returns: Vec<f64>,
    trade_pnls: Vec<f64>,
}

/// Apply positions to close-to-close returns inside `window`.
///
/// Trades are maximal runs of one non-zero position; a run still open at
/// the window end is closed there.
fn simulate(closes: &[f64], positions: &[f64], window: IndexRange) -> Run {
    let mut equity = Vec::with_capacity(window.len());
    let mut returns = Vec::with_capacity(window.len().saturating_sub(1));
    let mut trade_pnls = Vec::new();
    let mut value = 1.0;
    equity.push(value);

    let mut open: Option<(f64, f64)> = None; // (side, growth)
    for t in window.start..window.end - 1 {
        let pos = positions[t];
        let r = pos * (closes[t + 1] / closes[t] - 1.0);
        value *= 1.0 + r;
        equity.push(value);
        returns.push(r);

        open = match open {
            Some((side, growth)) if side == pos => Some((side, growth * (1.0 + r))),
            Some((_, growth)) => {
                trade_pnls.push(growth - 1.0);
                (pos != 0.0).then_some((pos, 1.0 + r))
            }
            None => (pos != 0.0).then_some((pos, 1.0 + r)),
        };
    }
    if let Some((_, growth)) = open {
        trade_pnls.push(growth - 1.0);
    }
    Run { equity, returns, trade_pnls }
}
