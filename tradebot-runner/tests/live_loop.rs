//! Integration tests for the live loop driver: termination, snapshots,
//! fetch failures, rebalancing and cooperative cancellation.

use std::sync::mpsc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tradebot_core::bot::{BotSettings, BotState};
use tradebot_core::domain::{AssetClass, CloseReason, PricePoint, Universe};
use tradebot_core::feed::{PriceError, PriceSource, SimulatedExecutor};
use tradebot_core::ledger::{FixedQuantity, LedgerConfig, RiskLimits};
use tradebot_core::metrics::Annualization;
use tradebot_core::rng::{ScriptedRandom, SeededRandom};
use tradebot_core::signals::{SignalEngine, Strategy, ThresholdProfile};
use tradebot_runner::config::{SymbolSelection, Timeframe};
use tradebot_runner::live::{
    Clock, LiveLoopDriver, LiveOptions, StopHandle, StopReason, TickInterval,
};
use tradebot_runner::sources::{RandomWalkSource, ReplaySource};

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 14, 0, 0).unwrap()
}

/// Always reports the same instant.
struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&mut self) -> DateTime<Utc> {
        self.0
    }
}

/// Advances by `step` on every call.
struct SteppingClock {
    now: DateTime<Utc>,
    step: Duration,
}

impl Clock for SteppingClock {
    fn now(&mut self) -> DateTime<Utc> {
        let now = self.now;
        self.now = now + self.step;
        now
    }
}

/// Replays prices and raises the stop flag on the `nth` fetch of `symbol`.
struct StopOnFetch {
    inner: ReplaySource,
    symbol: &'static str,
    nth: usize,
    fetches: usize,
    stop: StopHandle,
}

impl PriceSource for StopOnFetch {
    fn get_price(&mut self, symbol: &str) -> Result<f64, PriceError> {
        let price = self.inner.get_price(symbol)?;
        if symbol == self.symbol {
            self.fetches += 1;
            if self.fetches == self.nth {
                self.stop.stop();
            }
        }
        Ok(price)
    }

    fn name(&self) -> &str {
        "stop-on-fetch"
    }
}

fn options(max_ticks: Option<u64>) -> LiveOptions {
    LiveOptions {
        interval: TickInterval::Fixed(StdDuration::ZERO),
        timeframe: Timeframe::UntilCanceled,
        selection: SymbolSelection::All,
        max_ticks,
        liquidate_on_stop: false,
        annualization: Annualization::TradingDays,
    }
}

/// Momentum bot on BTC and ETH with five flat seed prices each.
fn seeded_bot(rebalance_every: Option<usize>) -> BotState {
    let universe = Universe::new()
        .with("BTC", AssetClass::Crypto)
        .with("ETH", AssetClass::Crypto);
    let mut bot = BotState::new(
        SignalEngine::with_profile(Strategy::Momentum, ThresholdProfile::Simulated),
        LedgerConfig::new(RiskLimits::from_percent(5.0, 10.0).unwrap()),
        Box::new(FixedQuantity::new(1.0)),
        universe,
    )
    .with_settings(BotSettings {
        rebalance_every,
        ..BotSettings::default()
    });
    for i in 0..5 {
        let ts = t0() - Duration::minutes(10 - i);
        bot.seed_history(PricePoint::new(ts, "BTC", 100.0)).unwrap();
        bot.seed_history(PricePoint::new(ts, "ETH", 100.0)).unwrap();
    }
    bot
}

fn driver(bot: BotState, source: ReplaySource, opts: LiveOptions) -> LiveLoopDriver {
    LiveLoopDriver::new(
        bot,
        Box::new(source),
        Box::new(SimulatedExecutor::new()),
        Box::new(ScriptedRandom::constant(0.9)),
        opts,
    )
    .with_clock(Box::new(FixedClock(t0())))
}

// ──────────────────────────────────────────────
// Termination
// ──────────────────────────────────────────────

#[test]
fn stops_after_max_ticks_with_one_snapshot_per_tick() {
    let source = ReplaySource::new()
        .with_prices("BTC", [100.0, 100.0, 100.0])
        .with_prices("ETH", [100.0, 100.0, 100.0]);
    let (tx, rx) = mpsc::channel();
    let summary = driver(seeded_bot(None), source, options(Some(3)))
        .with_snapshots(tx)
        .run();

    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.stop_reason, StopReason::MaxTicks);

    let snapshots: Vec<_> = rx.iter().collect();
    let ticks: Vec<u64> = snapshots.iter().map(|s| s.tick).collect();
    assert_eq!(ticks, vec![1, 2, 3]);
    assert!(snapshots.iter().all(|s| s.timestamp == t0()));
}

#[test]
fn stop_before_start_runs_no_ticks() {
    let d = driver(seeded_bot(None), ReplaySource::new(), options(None));
    d.stop_handle().stop();
    let summary = d.run();
    assert_eq!(summary.ticks, 0);
    assert_eq!(summary.stop_reason, StopReason::Canceled);
}

#[test]
fn deadline_ends_the_loop() {
    let source = ReplaySource::new().with_prices("BTC", [100.0; 10]);
    let mut opts = options(None);
    opts.timeframe = Timeframe::OneDay;
    let summary = LiveLoopDriver::new(
        seeded_bot(None),
        Box::new(source),
        Box::new(SimulatedExecutor::new()),
        Box::new(ScriptedRandom::constant(0.5)),
        opts,
    )
    .with_clock(Box::new(SteppingClock {
        now: t0(),
        step: Duration::hours(12),
    }))
    .run();

    // start, +12h (tick 1), +24h (deadline)
    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.stop_reason, StopReason::Deadline);
}

// ──────────────────────────────────────────────
// Per-tick behaviour
// ──────────────────────────────────────────────

#[test]
fn failed_fetch_skips_symbol_only() {
    // No ETH prices at all: ETH is skipped, BTC still trades.
    let source = ReplaySource::new().with_prices("BTC", [101.0]);
    let mut d = driver(seeded_bot(None), source, options(None));
    let events = d.tick(t0());

    assert_eq!(events.len(), 1);
    assert_eq!(d.bot().history("BTC").unwrap().len(), 6);
    assert_eq!(d.bot().history("ETH").unwrap().len(), 5);
    assert!(d.bot().ledger().has_position("BTC"));
    assert!(!d.bot().ledger().has_position("ETH"));

    // BTC queue now exhausted: the next tick changes nothing.
    assert!(d.tick(t0()).is_empty());
    assert_eq!(d.bot().history("BTC").unwrap().len(), 6);
}

#[test]
fn rebalance_after_k_closed_trades() {
    // Tick 1 opens both longs at 101. Tick 2: BTC hits take-profit, which
    // makes one closed trade and triggers the rebalance of ETH.
    let source = ReplaySource::new()
        .with_prices("BTC", [101.0, 120.0])
        .with_prices("ETH", [101.0, 101.0]);
    let summary = driver(seeded_bot(Some(1)), source, options(Some(2))).run();

    assert_eq!(summary.trades.len(), 2);
    assert_eq!(summary.trades[0].symbol, "BTC");
    assert_eq!(summary.trades[0].reason, CloseReason::TakeProfit);
    assert_eq!(summary.trades[1].symbol, "ETH");
    assert_eq!(summary.trades[1].reason, CloseReason::Rebalance);
    assert!(summary.open_positions.is_empty());
}

#[test]
fn stop_mid_tick_skips_rebalance() {
    // Same prices as above, but the stop lands while BTC is being
    // processed on tick 2: the take-profit still books, ETH is not visited
    // and no rebalance runs.
    let stop = StopHandle::new();
    let source = StopOnFetch {
        inner: ReplaySource::new()
            .with_prices("BTC", [101.0, 120.0])
            .with_prices("ETH", [101.0, 101.0]),
        symbol: "BTC",
        nth: 2,
        fetches: 0,
        stop: stop.clone(),
    };
    let mut d = LiveLoopDriver::new(
        seeded_bot(Some(1)),
        Box::new(source),
        Box::new(SimulatedExecutor::new()),
        Box::new(ScriptedRandom::constant(0.9)),
        options(None),
    )
    .with_clock(Box::new(FixedClock(t0())))
    .with_stop_handle(stop);

    d.tick(t0());
    assert!(d.bot().ledger().has_position("BTC"));
    assert!(d.bot().ledger().has_position("ETH"));

    let events = d.tick(t0());
    let trades = d.bot().ledger().trades().records();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].reason, CloseReason::TakeProfit);
    assert!(d.bot().ledger().has_position("ETH"));
    assert_eq!(d.bot().history("ETH").unwrap().len(), 6);
    assert!(!events.is_empty());
}

#[test]
fn liquidate_on_stop_closes_everything() {
    let source = ReplaySource::new()
        .with_prices("BTC", [101.0])
        .with_prices("ETH", [102.0]);
    let mut opts = options(Some(1));
    opts.liquidate_on_stop = true;
    let summary = driver(seeded_bot(None), source, opts).run();

    assert_eq!(summary.trades.len(), 2);
    assert!(summary
        .trades
        .iter()
        .all(|t| t.reason == CloseReason::EndOfRun));
    assert!(summary.open_positions.is_empty());
    assert_eq!(summary.metrics.trade_count, 2);
}

#[test]
fn random_one_selection_still_checks_open_positions() {
    // Draw 0.0 always selects BTC (index 0). ETH is never selected, so it
    // never opens.
    let source = ReplaySource::new()
        .with_prices("BTC", [101.0, 120.0])
        .with_prices("ETH", [101.0, 101.0]);
    let mut opts = options(Some(2));
    opts.selection = SymbolSelection::RandomOne;
    let summary = LiveLoopDriver::new(
        seeded_bot(None),
        Box::new(source),
        Box::new(SimulatedExecutor::new()),
        Box::new(ScriptedRandom::new(vec![0.0, 0.9])),
        opts,
    )
    .with_clock(Box::new(FixedClock(t0())))
    .run();

    // Tick 1: select BTC (0.0), momentum draw 0.9 opens it.
    // Tick 2: select BTC (0.0); take-profit at 120 closes it.
    assert_eq!(summary.trades.len(), 1);
    assert_eq!(summary.trades[0].symbol, "BTC");
    assert_eq!(summary.trades[0].reason, CloseReason::TakeProfit);
}

// ──────────────────────────────────────────────
// Background thread
// ──────────────────────────────────────────────

#[test]
fn spawned_loop_stops_promptly_while_sleeping() {
    let walk = RandomWalkSource::new(
        [("BTC".to_string(), 100.0), ("ETH".to_string(), 50.0)],
        Box::new(SeededRandom::new(11)),
    );
    let mut opts = options(None);
    opts.interval = TickInterval::Jittered {
        min_secs: 5,
        max_secs: 20,
    };
    let (tx, rx) = mpsc::channel();
    let d = LiveLoopDriver::new(
        seeded_bot(None),
        Box::new(walk),
        Box::new(SimulatedExecutor::new()),
        Box::new(SeededRandom::new(3)),
        opts,
    )
    .with_snapshots(tx);

    let (stop, handle) = d.spawn().unwrap();
    let first = rx.recv_timeout(StdDuration::from_secs(10)).unwrap();
    assert_eq!(first.tick, 1);

    let asked = std::time::Instant::now();
    stop.stop();
    let summary = handle.join().unwrap();
    assert_eq!(summary.stop_reason, StopReason::Canceled);
    assert_eq!(summary.ticks, 1);
    assert!(asked.elapsed() < StdDuration::from_secs(2));
}

#[test]
fn external_stop_liquidates_spawned_loop() {
    // A watcher thread owns a clone of the stop flag, the way the CLI's
    // stdin watcher does.
    let stop = StopHandle::new();
    let source = ReplaySource::new()
        .with_prices("BTC", [101.0])
        .with_prices("ETH", [101.0]);
    let mut opts = options(None);
    opts.interval = TickInterval::Fixed(StdDuration::from_secs(60));
    opts.liquidate_on_stop = true;
    let (tx, rx) = mpsc::channel();
    let d = driver(seeded_bot(None), source, opts)
        .with_stop_handle(stop.clone())
        .with_snapshots(tx);

    let (_, handle) = d.spawn().unwrap();
    let first = rx.recv_timeout(StdDuration::from_secs(10)).unwrap();
    assert_eq!(first.open_positions.len(), 2);

    let (line_tx, line_rx) = mpsc::channel::<()>();
    let watcher = std::thread::spawn(move || {
        if line_rx.recv().is_ok() {
            stop.stop();
        }
    });
    line_tx.send(()).unwrap();
    watcher.join().unwrap();

    let summary = handle.join().unwrap();
    assert_eq!(summary.stop_reason, StopReason::Canceled);
    assert_eq!(summary.ticks, 1);
    assert_eq!(summary.trades.len(), 2);
    assert!(summary
        .trades
        .iter()
        .all(|t| t.reason == CloseReason::EndOfRun));
    assert!(summary.open_positions.is_empty());
}
