//! Bot configuration loaded from TOML.
//!
//! Every section is optional; missing values fall back to [`BotConfig::default`],
//! which reproduces the stock paper bot: Momentum, 5% stop, 10% target,
//! 1–10 random shares, four equities and four cryptos, one equity entry per
//! day.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradebot_core::bot::{BotSettings, BotState};
use tradebot_core::domain::{AssetClass, Universe};
use tradebot_core::ledger::{
    BalanceFraction, DayTradeGuard, FixedQuantity, LedgerConfig, RandomShares, RiskError,
    RiskLimits, SizingPolicy,
};
use tradebot_core::metrics::Annualization;
use tradebot_core::signals::{SignalEngine, SignalParams, Strategy, ThresholdProfile};

/// Configuration errors, reported at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("risk: {0}")]
    Risk(#[from] RiskError),
    #[error("symbol list is empty")]
    NoSymbols,
    #[error("duplicate symbol '{0}'")]
    DuplicateSymbol(String),
    #[error("invalid sizing: {0}")]
    Sizing(String),
    #[error("invalid tick interval: {0}")]
    Interval(String),
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub bot: BotSection,
    pub signals: SignalOverrides,
    pub risk: RiskSection,
    pub sizing: SizingConfig,
    pub day_trade_guard: DayTradeGuardConfig,
    pub symbols: Vec<SymbolConfig>,
    pub backtest: BacktestSection,
    pub live: LiveSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BotSection {
    pub strategy: Strategy,
    pub profile: ThresholdProfile,
    /// Master seed. `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub initial_balance: f64,
    pub allow_short: bool,
    pub exit_on_opposite_signal: bool,
    pub annualization: Annualization,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            strategy: Strategy::Momentum,
            profile: ThresholdProfile::Simulated,
            seed: None,
            initial_balance: 10_000.0,
            allow_short: true,
            exit_on_opposite_signal: false,
            annualization: Annualization::TradingDays,
        }
    }
}

/// Threshold overrides layered over the `bot.profile` values.
///
/// Only the keys present in `[signals.<strategy>]` replace the profile's
/// numbers; everything else keeps the profile default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SignalOverrides {
    pub momentum: MomentumOverrides,
    pub breakout: BreakoutOverrides,
    pub mean_reversion: MeanReversionOverrides,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MomentumOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_above: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_below: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BreakoutOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_above: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_below: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MeanReversionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_below: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_above: Option<f64>,
}

impl SignalOverrides {
    /// Replace the profile values named by an override.
    pub fn apply(&self, mut params: SignalParams) -> SignalParams {
        let m = &self.momentum;
        if let Some(v) = m.lookback {
            params.momentum.lookback = v;
        }
        if let Some(v) = m.buy_above {
            params.momentum.buy_above = v;
        }
        if let Some(v) = m.sell_below {
            params.momentum.sell_below = v;
        }

        let b = &self.breakout;
        if let Some(v) = b.lookback {
            params.breakout.lookback = v;
        }
        if let Some(v) = b.margin {
            params.breakout.margin = v;
        }
        if let Some(v) = b.buy_above {
            params.breakout.buy_above = v;
        }
        if let Some(v) = b.sell_below {
            params.breakout.sell_below = v;
        }

        let r = &self.mean_reversion;
        if let Some(v) = r.lookback {
            params.mean_reversion.lookback = v;
        }
        if let Some(v) = r.band {
            params.mean_reversion.band = v;
        }
        if let Some(v) = r.buy_below {
            params.mean_reversion.buy_below = v;
        }
        if let Some(v) = r.sell_above {
            params.mean_reversion.sell_above = v;
        }
        params
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskSection {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Per-side fee as a fraction of notional.
    pub fee_rate: f64,
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            stop_loss_pct: 5.0,
            take_profit_pct: 10.0,
            fee_rate: 0.0,
        }
    }
}

/// Position sizer configuration (serializable enum).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingConfig {
    /// Uniform random whole shares in `[min, max]`.
    RandomShares { min: u32, max: u32 },
    /// Fraction of the available balance.
    BalanceFraction {
        fraction: f64,
        #[serde(default)]
        whole_units: bool,
    },
    FixedQuantity { quantity: f64 },
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig::RandomShares { min: 1, max: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DayTradeGuardConfig {
    pub enabled: bool,
    pub max_entries_per_day: u32,
}

impl Default for DayTradeGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries_per_day: 1,
        }
    }
}

/// One tradable instrument plus the parameters of its synthetic series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolConfig {
    pub symbol: String,
    #[serde(default = "default_class")]
    pub class: AssetClass,
    #[serde(default = "default_start_price")]
    pub start_price: f64,
    /// Mean of the normal per-step increment.
    #[serde(default = "default_step_mean")]
    pub step_mean: f64,
    /// Standard deviation of the per-step increment.
    #[serde(default = "default_step_std")]
    pub step_std: f64,
}

fn default_class() -> AssetClass {
    AssetClass::Crypto
}

fn default_start_price() -> f64 {
    100.0
}

fn default_step_mean() -> f64 {
    0.0
}

fn default_step_std() -> f64 {
    1.0
}

impl SymbolConfig {
    pub fn new(
        symbol: &str,
        class: AssetClass,
        start_price: f64,
        step_mean: f64,
        step_std: f64,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            class,
            start_price,
            step_mean,
            step_std,
        }
    }
}

fn default_symbols() -> Vec<SymbolConfig> {
    vec![
        SymbolConfig::new("GOOGL", AssetClass::Equity, 1_000.0, 200.0, 5.0),
        SymbolConfig::new("AMZN", AssetClass::Equity, 500.0, 100.0, 3.0),
        SymbolConfig::new("MSFT", AssetClass::Equity, 800.0, 150.0, 4.0),
        SymbolConfig::new("TSLA", AssetClass::Equity, 2_000.0, 800.0, 10.0),
        SymbolConfig::new("BTC", AssetClass::Crypto, 50_000.0, 50_000.0, 1_000.0),
        SymbolConfig::new("ETH", AssetClass::Crypto, 3_000.0, 3_000.0, 200.0),
        SymbolConfig::new("SOL", AssetClass::Crypto, 150.0, 15.0, 1.0),
        SymbolConfig::new("ADA", AssetClass::Crypto, 0.5, 0.05, 0.005),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestSection {
    /// Synthetic bars per symbol.
    pub periods: usize,
    /// First bar date; bars advance one business day at a time.
    pub start_date: NaiveDate,
    /// Process symbols on the rayon pool with per-symbol derived seeds.
    pub parallel: bool,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            periods: 100,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default(),
            parallel: false,
        }
    }
}

/// Delay between live ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntervalConfig {
    /// Uniform whole seconds in `[min_secs, max_secs]`.
    Jittered { min_secs: u64, max_secs: u64 },
    Fixed { secs: u64 },
}

impl Default for IntervalConfig {
    fn default() -> Self {
        IntervalConfig::Jittered {
            min_secs: 5,
            max_secs: 20,
        }
    }
}

/// How long the live loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    #[default]
    OneDay,
    OneWeek,
    /// 30 days.
    OneMonth,
    UntilCanceled,
}

impl Timeframe {
    pub fn duration(self) -> Option<chrono::Duration> {
        match self {
            Timeframe::OneDay => Some(chrono::Duration::days(1)),
            Timeframe::OneWeek => Some(chrono::Duration::weeks(1)),
            Timeframe::OneMonth => Some(chrono::Duration::days(30)),
            Timeframe::UntilCanceled => None,
        }
    }
}

/// Which symbols are evaluated for entries on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolSelection {
    #[default]
    All,
    /// One random symbol per tick; open positions are still checked.
    RandomOne,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveSection {
    pub interval: IntervalConfig,
    pub timeframe: Timeframe,
    pub selection: SymbolSelection,
    /// Rebalance after every K closed trades.
    pub rebalance_every: Option<usize>,
    pub max_ticks: Option<u64>,
    pub liquidate_on_stop: bool,
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            interval: IntervalConfig::default(),
            timeframe: Timeframe::OneDay,
            selection: SymbolSelection::All,
            rebalance_every: Some(5),
            max_ticks: None,
            liquidate_on_stop: false,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot: BotSection::default(),
            signals: SignalOverrides::default(),
            risk: RiskSection::default(),
            sizing: SizingConfig::default(),
            day_trade_guard: DayTradeGuardConfig::default(),
            symbols: default_symbols(),
            backtest: BacktestSection::default(),
            live: LiveSection::default(),
        }
    }
}

impl BotConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Fail fast on anything that would otherwise surface mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk_limits()?;
        if !(self.risk.fee_rate.is_finite() && (0.0..1.0).contains(&self.risk.fee_rate)) {
            return Err(ConfigError::OutOfRange {
                field: "risk.fee_rate",
                expected: "in [0, 1)",
                value: self.risk.fee_rate,
            });
        }
        if !(self.bot.initial_balance.is_finite() && self.bot.initial_balance > 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "bot.initial_balance",
                expected: "positive",
                value: self.bot.initial_balance,
            });
        }
        if let Annualization::Custom(n) = self.bot.annualization {
            if !(n.is_finite() && n > 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: "bot.annualization",
                    expected: "positive",
                    value: n,
                });
            }
        }

        match &self.sizing {
            SizingConfig::RandomShares { min, max } => {
                if *min == 0 || max < min {
                    return Err(ConfigError::Sizing(format!(
                        "random_shares needs 1 <= min <= max, got [{min}, {max}]"
                    )));
                }
            }
            SizingConfig::BalanceFraction { fraction, .. } => {
                if !(*fraction > 0.0 && *fraction <= 1.0) {
                    return Err(ConfigError::Sizing(format!(
                        "balance_fraction must be in (0, 1], got {fraction}"
                    )));
                }
            }
            SizingConfig::FixedQuantity { quantity } => {
                if !(quantity.is_finite() && *quantity > 0.0) {
                    return Err(ConfigError::Sizing(format!(
                        "fixed_quantity must be positive, got {quantity}"
                    )));
                }
            }
        }

        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen = std::collections::HashSet::new();
        for s in &self.symbols {
            if !seen.insert(s.symbol.as_str()) {
                return Err(ConfigError::DuplicateSymbol(s.symbol.clone()));
            }
            if !(s.start_price.is_finite() && s.start_price > 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: "symbols.start_price",
                    expected: "positive",
                    value: s.start_price,
                });
            }
            if !(s.step_std.is_finite() && s.step_std >= 0.0) {
                return Err(ConfigError::OutOfRange {
                    field: "symbols.step_std",
                    expected: "non-negative",
                    value: s.step_std,
                });
            }
        }

        match self.live.interval {
            IntervalConfig::Jittered { min_secs, max_secs } if max_secs < min_secs => {
                return Err(ConfigError::Interval(format!(
                    "jittered range is inverted: [{min_secs}, {max_secs}]"
                )));
            }
            _ => {}
        }
        if self.live.rebalance_every == Some(0) {
            return Err(ConfigError::OutOfRange {
                field: "live.rebalance_every",
                expected: "at least 1",
                value: 0.0,
            });
        }
        if self.backtest.periods < 2 {
            return Err(ConfigError::OutOfRange {
                field: "backtest.periods",
                expected: "at least 2",
                value: self.backtest.periods as f64,
            });
        }
        if self.day_trade_guard.enabled && self.day_trade_guard.max_entries_per_day == 0 {
            return Err(ConfigError::OutOfRange {
                field: "day_trade_guard.max_entries_per_day",
                expected: "at least 1 (set enabled = false to lift the limit)",
                value: 0.0,
            });
        }
        validate_signal_params(&self.signal_params())
    }

    /// Deterministic content hash of the full configuration.
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    // ─── Builders for core components ───────────────────────────────

    pub fn risk_limits(&self) -> Result<RiskLimits, RiskError> {
        RiskLimits::from_percent(self.risk.stop_loss_pct, self.risk.take_profit_pct)
    }

    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let mut ledger = LedgerConfig::new(self.risk_limits()?);
        ledger.fee_rate = self.risk.fee_rate;
        ledger.initial_balance = self.bot.initial_balance;
        Ok(ledger)
    }

    /// Profile thresholds with any `[signals]` overrides applied.
    pub fn signal_params(&self) -> SignalParams {
        self.signals.apply(SignalParams::for_profile(self.bot.profile))
    }

    pub fn signal_engine(&self) -> SignalEngine {
        SignalEngine::new(self.bot.strategy, self.signal_params())
    }

    /// Build the configured sizer. Call after [`validate`](Self::validate).
    pub fn sizing_policy(&self) -> Box<dyn SizingPolicy> {
        match self.sizing {
            SizingConfig::RandomShares { min, max } => Box::new(RandomShares::new(min, max)),
            SizingConfig::BalanceFraction {
                fraction,
                whole_units,
            } => Box::new(BalanceFraction::new(fraction, whole_units)),
            SizingConfig::FixedQuantity { quantity } => Box::new(FixedQuantity::new(quantity)),
        }
    }

    pub fn day_trade_guard(&self) -> Option<DayTradeGuard> {
        self.day_trade_guard
            .enabled
            .then(|| DayTradeGuard::new(self.day_trade_guard.max_entries_per_day))
    }

    pub fn universe(&self) -> Universe {
        let mut universe = Universe::new();
        for s in &self.symbols {
            universe.insert(s.symbol.clone(), s.class);
        }
        universe
    }

    /// Settings for a backtest: no periodic rebalancing.
    pub fn backtest_settings(&self) -> BotSettings {
        BotSettings {
            allow_short: self.bot.allow_short,
            exit_on_opposite_signal: self.bot.exit_on_opposite_signal,
            rebalance_every: None,
        }
    }

    pub fn live_settings(&self) -> BotSettings {
        BotSettings {
            rebalance_every: self.live.rebalance_every,
            ..self.backtest_settings()
        }
    }

    /// Assemble a fresh [`BotState`] with the given settings.
    pub fn build_bot(&self, settings: BotSettings) -> Result<BotState, ConfigError> {
        let mut bot = BotState::new(
            self.signal_engine(),
            self.ledger_config()?,
            self.sizing_policy(),
            self.universe(),
        )
        .with_settings(settings);
        if let Some(guard) = self.day_trade_guard() {
            bot = bot.with_guard(guard);
        }
        Ok(bot)
    }
}

fn validate_signal_params(params: &SignalParams) -> Result<(), ConfigError> {
    let lookbacks = [
        ("signals.momentum.lookback", params.momentum.lookback),
        ("signals.breakout.lookback", params.breakout.lookback),
        ("signals.mean_reversion.lookback", params.mean_reversion.lookback),
    ];
    for (field, lookback) in lookbacks {
        if lookback == 0 {
            return Err(ConfigError::OutOfRange {
                field,
                expected: "at least 1",
                value: 0.0,
            });
        }
    }

    let probabilities = [
        ("signals.momentum.buy_above", params.momentum.buy_above),
        ("signals.momentum.sell_below", params.momentum.sell_below),
        ("signals.breakout.buy_above", params.breakout.buy_above),
        ("signals.breakout.sell_below", params.breakout.sell_below),
        ("signals.mean_reversion.buy_below", params.mean_reversion.buy_below),
        ("signals.mean_reversion.sell_above", params.mean_reversion.sell_above),
    ];
    for (field, value) in probabilities {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::OutOfRange {
                field,
                expected: "in [0, 1]",
                value,
            });
        }
    }

    let widths = [
        ("signals.breakout.margin", params.breakout.margin),
        ("signals.mean_reversion.band", params.mean_reversion.band),
    ];
    for (field, value) in widths {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field,
                expected: "non-negative",
                value,
            });
        }
    }
    Ok(())
}
