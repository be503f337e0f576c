//! Backtest runner: replays price series through the bot pipeline.
//!
//! Each symbol is replayed independently on its own `BotState`: the first
//! point seeds the history, every later point goes through `BotState::step`,
//! and whatever is still open at the end is liquidated at the final price.
//! Per-symbol trade logs are merged in symbol order.
//!
//! Two entry points:
//! - [`BacktestRunner::run`]: one caller-supplied random source threaded
//!   through the symbols in sorted order.
//! - [`BacktestRunner::run_seeded`]: one derived stream per symbol, optionally
//!   on the rayon pool. Output does not depend on scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use tradebot_core::domain::{HistoryError, PricePoint, TradeLog, TradeRecord};
use tradebot_core::feed::SimulatedExecutor;
use tradebot_core::metrics::Metrics;
use tradebot_core::rng::{RandomSource, RngHierarchy};
use tradebot_core::signals::Strategy;

use crate::config::{BotConfig, ConfigError};
use crate::data_loader::{LoadError, SeriesMap};

/// Stream index reserved for signal and sizing draws in the seed hierarchy.
pub const SIGNAL_STREAM: u64 = 1;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("price history error: {0}")]
    History(#[from] HistoryError),
}

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy: Strategy,
    pub config_hash: String,
    /// Master seed for seeded runs; `None` when the caller supplied the source.
    pub seed: Option<u64>,
    pub metrics: Metrics,
    pub trades: Vec<TradeRecord>,
    pub symbol_count: usize,
    pub bar_count: usize,
    pub signal_count: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Outcome of replaying a single symbol.
#[derive(Debug, Default)]
struct SymbolRun {
    trades: TradeLog,
    bars: usize,
    signals: usize,
}

#[derive(Debug, Clone)]
pub struct BacktestRunner {
    config: BotConfig,
}

impl BacktestRunner {
    pub fn new(config: BotConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Replay all series with a single random source, symbols in sorted order.
    pub fn run(
        &self,
        series: &SeriesMap,
        rng: &mut dyn RandomSource,
    ) -> Result<BacktestResult, RunError> {
        let mut runs = Vec::with_capacity(series.len());
        for (symbol, points) in series {
            runs.push(self.run_symbol(symbol, points, rng)?);
        }
        Ok(self.finish(runs, None))
    }

    /// Replay all series with per-symbol streams derived from `master_seed`.
    ///
    /// With `backtest.parallel` set, symbols run on the rayon pool; the result
    /// is identical to the sequential path.
    pub fn run_seeded(
        &self,
        series: &SeriesMap,
        master_seed: u64,
    ) -> Result<BacktestResult, RunError> {
        let seeds = RngHierarchy::new(master_seed);
        let entries: Vec<(&String, &Vec<PricePoint>)> = series.iter().collect();

        let replay = |(symbol, points): &(&String, &Vec<PricePoint>)| {
            let mut rng = seeds.source_for(symbol, SIGNAL_STREAM);
            self.run_symbol(symbol, points, &mut rng)
        };

        let runs: Vec<SymbolRun> = if self.config.backtest.parallel {
            entries
                .par_iter()
                .map(replay)
                .collect::<Result<Vec<_>, RunError>>()?
        } else {
            entries
                .iter()
                .map(replay)
                .collect::<Result<Vec<_>, RunError>>()?
        };
        Ok(self.finish(runs, Some(master_seed)))
    }

    fn run_symbol(
        &self,
        symbol: &str,
        points: &[PricePoint],
        rng: &mut dyn RandomSource,
    ) -> Result<SymbolRun, RunError> {
        let Some((first, rest)) = points.split_first() else {
            return Ok(SymbolRun::default());
        };
        let mut bot = self.config.build_bot(self.config.backtest_settings())?;
        let mut executor = SimulatedExecutor::new();

        bot.seed_history(first.clone())?;
        for point in rest {
            bot.step(point.clone(), true, rng, &mut executor)?;
        }
        let end = points.last().map_or(first.timestamp, |p| p.timestamp);
        bot.liquidate(end, &mut executor);

        let bars = bot.bars_processed();
        let signals = bot.signals_emitted();
        let trades = bot.into_ledger().into_trades();
        info!(symbol, bars, signals, trades = trades.len(), "symbol replayed");
        Ok(SymbolRun {
            trades,
            bars,
            signals,
        })
    }

    fn finish(&self, runs: Vec<SymbolRun>, seed: Option<u64>) -> BacktestResult {
        let symbol_count = runs.len();
        let bar_count = runs.iter().map(|r| r.bars).sum();
        let signal_count = runs.iter().map(|r| r.signals).sum();
        let log = TradeLog::merge(runs.into_iter().map(|r| r.trades));
        let metrics = Metrics::compute(log.records(), self.config.bot.annualization);
        info!(
            strategy = %self.config.bot.strategy,
            trades = log.len(),
            total_pnl = metrics.total_pnl,
            "backtest complete"
        );
        BacktestResult {
            schema_version: SCHEMA_VERSION,
            strategy: self.config.bot.strategy,
            config_hash: self.config.config_hash(),
            seed,
            metrics,
            trades: log.into_records(),
            symbol_count,
            bar_count,
            signal_count,
        }
    }
}

/// Run a backtest with the default configuration and the given strategy and
/// risk thresholds.
pub fn run_backtest(
    strategy: Strategy,
    stop_loss_pct: f64,
    take_profit_pct: f64,
    series: &SeriesMap,
    rng: &mut dyn RandomSource,
) -> Result<(Vec<TradeRecord>, Metrics), RunError> {
    let mut config = BotConfig::default();
    config.bot.strategy = strategy;
    config.risk.stop_loss_pct = stop_loss_pct;
    config.risk.take_profit_pct = take_profit_pct;
    let result = BacktestRunner::new(config)?.run(series, rng)?;
    Ok((result.trades, result.metrics))
}
