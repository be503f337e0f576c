//! Tradebot Runner: configuration, data, backtests, live loop, export.
//!
//! This crate builds on `tradebot-core` to provide:
//! - TOML configuration with validation and defaults matching the paper bot
//! - Synthetic and CSV price series
//! - Backtest runner (sequential or per-symbol parallel, deterministic)
//! - Live loop driver with cooperative cancellation and snapshots
//! - Price sources for replay and random-walk paper trading
//! - JSON / CSV artifact export

pub mod backtest;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod live;
pub mod sources;

pub use backtest::{run_backtest, BacktestResult, BacktestRunner, RunError};
pub use config::{BotConfig, ConfigError};
pub use data_loader::{load_csv, synthetic_series, LoadError, SeriesMap};
pub use export::{load_artifacts, save_artifacts};
pub use live::{
    Clock, LiveLoopDriver, LiveOptions, LiveSnapshot, LiveSummary, StopHandle, StopReason,
    SystemClock, TickInterval,
};
pub use sources::{RandomWalkSource, ReplaySource};
