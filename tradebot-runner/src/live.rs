//! Live loop driver: a cooperative, cancelable polling loop.
//!
//! Each tick: check the stop flag, check the deadline, pull fresh prices for
//! open positions and for the symbols selected this tick, run them through
//! [`BotState::step`], rebalance if due, and publish a [`LiveSnapshot`].
//! Ticks are strictly sequential and all state lives in the driver.
//!
//! The stop flag is an `Arc<AtomicBool>` shared through [`StopHandle`]; it is
//! polled at the top of each tick, before each symbol, and while sleeping.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use tradebot_core::bot::{BotState, TickEvent};
use tradebot_core::domain::{Position, PricePoint, TradeRecord};
use tradebot_core::feed::{OrderExecutor, PriceSource};
use tradebot_core::metrics::{Annualization, Metrics};
use tradebot_core::rng::RandomSource;

use crate::config::{BotConfig, IntervalConfig, SymbolSelection, Timeframe};

/// Longest uninterrupted sleep slice; bounds stop latency.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Delay between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickInterval {
    Fixed(Duration),
    /// Uniform whole seconds in `[min_secs, max_secs]`.
    Jittered { min_secs: u64, max_secs: u64 },
}

impl TickInterval {
    pub fn next(&self, rng: &mut dyn RandomSource) -> Duration {
        match *self {
            TickInterval::Fixed(d) => d,
            TickInterval::Jittered { min_secs, max_secs } => {
                let low = u32::try_from(min_secs).unwrap_or(u32::MAX);
                let high = u32::try_from(max_secs).unwrap_or(u32::MAX);
                Duration::from_secs(u64::from(rng.next_int(low, high)))
            }
        }
    }
}

impl From<&IntervalConfig> for TickInterval {
    fn from(cfg: &IntervalConfig) -> Self {
        match *cfg {
            IntervalConfig::Fixed { secs } => TickInterval::Fixed(Duration::from_secs(secs)),
            IntervalConfig::Jittered { min_secs, max_secs } => {
                TickInterval::Jittered { min_secs, max_secs }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub interval: TickInterval,
    pub timeframe: Timeframe,
    pub selection: SymbolSelection,
    pub max_ticks: Option<u64>,
    pub liquidate_on_stop: bool,
    pub annualization: Annualization,
}

impl LiveOptions {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            interval: TickInterval::from(&config.live.interval),
            timeframe: config.live.timeframe,
            selection: config.live.selection,
            max_ticks: config.live.max_ticks,
            liquidate_on_stop: config.live.liquidate_on_stop,
            annualization: config.bot.annualization,
        }
    }
}

/// Wall-clock time source for deadlines and tick timestamps.
pub trait Clock: Send {
    fn now(&mut self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cloneable handle that requests a cooperative stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// State published after every tick.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub metrics: Metrics,
    pub open_positions: Vec<Position>,
    pub trade_count: usize,
    pub events: Vec<TickEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Canceled,
    Deadline,
    MaxTicks,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Canceled => write!(f, "canceled"),
            StopReason::Deadline => write!(f, "deadline reached"),
            StopReason::MaxTicks => write!(f, "tick limit reached"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveSummary {
    pub ticks: u64,
    pub stop_reason: StopReason,
    pub trades: Vec<TradeRecord>,
    pub metrics: Metrics,
    pub open_positions: Vec<Position>,
}

pub struct LiveLoopDriver {
    bot: BotState,
    prices: Box<dyn PriceSource>,
    executor: Box<dyn OrderExecutor>,
    rng: Box<dyn RandomSource>,
    clock: Box<dyn Clock>,
    options: LiveOptions,
    stop: StopHandle,
    symbols: Vec<String>,
    snapshots: Option<Sender<LiveSnapshot>>,
}

impl LiveLoopDriver {
    pub fn new(
        bot: BotState,
        prices: Box<dyn PriceSource>,
        executor: Box<dyn OrderExecutor>,
        rng: Box<dyn RandomSource>,
        options: LiveOptions,
    ) -> Self {
        let symbols = bot.universe().symbols().map(str::to_string).collect();
        Self {
            bot,
            prices,
            executor,
            rng,
            clock: Box::new(SystemClock),
            options,
            stop: StopHandle::new(),
            symbols,
            snapshots: None,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_snapshots(mut self, tx: Sender<LiveSnapshot>) -> Self {
        self.snapshots = Some(tx);
        self
    }

    /// Share an existing stop flag instead of the driver's own.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn bot(&self) -> &BotState {
        &self.bot
    }

    /// Run the loop on a named background thread.
    pub fn spawn(self) -> std::io::Result<(StopHandle, JoinHandle<LiveSummary>)> {
        let stop = self.stop_handle();
        let handle = thread::Builder::new()
            .name("tradebot-live".into())
            .spawn(move || self.run())?;
        Ok((stop, handle))
    }

    /// Run until canceled, the deadline passes, or the tick limit is hit.
    pub fn run(mut self) -> LiveSummary {
        let started = self.clock.now();
        let deadline = self.options.timeframe.duration().map(|d| started + d);
        info!(
            strategy = %self.bot.engine().strategy(),
            symbols = self.symbols.len(),
            price_source = self.prices.name(),
            executor = self.executor.name(),
            ?deadline,
            "live loop started"
        );

        let mut ticks = 0u64;
        let stop_reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Canceled;
            }
            let now = self.clock.now();
            if deadline.is_some_and(|d| now >= d) {
                break StopReason::Deadline;
            }

            ticks += 1;
            let events = self.tick(now);
            self.publish(ticks, now, events);

            if self.options.max_ticks.is_some_and(|max| ticks >= max) {
                break StopReason::MaxTicks;
            }
            let delay = self.options.interval.next(self.rng.as_mut());
            if !sleep_unless_stopped(delay, &self.stop) {
                break StopReason::Canceled;
            }
        };

        if self.options.liquidate_on_stop {
            let now = self.clock.now();
            let events = self.bot.liquidate(now, self.executor.as_mut());
            if !events.is_empty() {
                self.publish(ticks, now, events);
            }
        }

        let metrics = self.bot.metrics(self.options.annualization);
        info!(
            ticks,
            reason = %stop_reason,
            trades = metrics.trade_count,
            total_pnl = metrics.total_pnl,
            "live loop stopped"
        );
        let open_positions = self.bot.ledger().open_positions().cloned().collect();
        LiveSummary {
            ticks,
            stop_reason,
            trades: self.bot.ledger().trades().records().to_vec(),
            metrics,
            open_positions,
        }
    }

    /// One polling pass at time `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<TickEvent> {
        let selected = self.select_symbols();
        let mut visit: BTreeSet<String> = self
            .bot
            .ledger()
            .open_positions()
            .map(|p| p.symbol.clone())
            .collect();
        visit.extend(selected.iter().cloned());

        let mut events = Vec::new();
        for symbol in visit {
            if self.stop.is_stopped() {
                debug!("stop requested mid-tick");
                break;
            }
            let price = match self.prices.get_price(&symbol) {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "price fetch failed, skipping");
                    continue;
                }
            };
            let allow_entry = selected.contains(&symbol);
            let point = PricePoint::new(now, symbol.as_str(), price);
            match self
                .bot
                .step(point, allow_entry, self.rng.as_mut(), self.executor.as_mut())
            {
                Ok(ev) => events.extend(ev),
                Err(e) => warn!(symbol = %symbol, error = %e, "price rejected"),
            }
        }

        if !self.stop.is_stopped() && self.bot.rebalance_due() {
            events.extend(self.bot.rebalance(now, self.executor.as_mut()));
        }
        events
    }

    fn select_symbols(&mut self) -> BTreeSet<String> {
        match self.options.selection {
            SymbolSelection::All => self.symbols.iter().cloned().collect(),
            SymbolSelection::RandomOne => {
                if self.symbols.is_empty() {
                    return BTreeSet::new();
                }
                let last = u32::try_from(self.symbols.len() - 1).unwrap_or(u32::MAX);
                let idx = self.rng.next_int(0, last) as usize;
                self.symbols.get(idx).cloned().into_iter().collect()
            }
        }
    }

    fn publish(&self, tick: u64, timestamp: DateTime<Utc>, events: Vec<TickEvent>) {
        let Some(tx) = &self.snapshots else {
            return;
        };
        let snapshot = LiveSnapshot {
            tick,
            timestamp,
            metrics: self.bot.metrics(self.options.annualization),
            open_positions: self.bot.ledger().open_positions().cloned().collect(),
            trade_count: self.bot.ledger().trades().len(),
            events,
        };
        if tx.send(snapshot).is_err() {
            debug!("snapshot receiver dropped");
        }
    }
}

/// Sleep for `total`, waking early if a stop is requested.
/// Returns `false` if interrupted.
fn sleep_unless_stopped(total: Duration, stop: &StopHandle) -> bool {
    let start = Instant::now();
    loop {
        if stop.is_stopped() {
            return false;
        }
        let elapsed = start.elapsed();
        if elapsed >= total {
            return true;
        }
        thread::sleep((total - elapsed).min(SLEEP_SLICE));
    }
}
