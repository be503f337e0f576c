//! BotState: one bot instance's complete mutable state.
//!
//! Both the backtest runner and the live loop drive the same [`BotState::step`]
//! pipeline; they differ only in where prices and time come from. Nothing in
//! here is shared between instances.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    CloseReason, HistoryError, Position, PositionSide, PriceHistory, PricePoint, TradeRecord,
    Universe,
};
use crate::feed::{ExecutionError, OrderExecutor, OrderSide};
use crate::ledger::{DayTradeGuard, LedgerConfig, PositionLedger, SizingPolicy};
use crate::metrics::{Annualization, Metrics};
use crate::rng::RandomSource;
use crate::signals::{Signal, SignalEngine};

/// Behavioural switches for a bot instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Open SHORT positions on SELL signals. When false, SELL never opens.
    pub allow_short: bool,
    /// Close an open position with STRATEGY_EXIT on the opposite signal.
    pub exit_on_opposite_signal: bool,
    /// Close everything with REBALANCE each time the closed-trade count
    /// crosses a multiple of this value.
    pub rebalance_every: Option<usize>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            allow_short: true,
            exit_on_opposite_signal: false,
            rebalance_every: None,
        }
    }
}

/// Something that happened while processing a price.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    Opened(Position),
    Closed(TradeRecord),
    /// Entry blocked by the day-trade guard.
    Suppressed { symbol: String, signal: Signal },
    OrderFailed {
        symbol: String,
        side: OrderSide,
        error: ExecutionError,
    },
}

pub struct BotState {
    engine: SignalEngine,
    ledger: PositionLedger,
    sizing: Box<dyn SizingPolicy>,
    guard: Option<DayTradeGuard>,
    universe: Universe,
    histories: BTreeMap<String, PriceHistory>,
    settings: BotSettings,
    rebalance_epoch: usize,
    bars_processed: usize,
    signals_emitted: usize,
}

impl BotState {
    pub fn new(
        engine: SignalEngine,
        ledger_config: LedgerConfig,
        sizing: Box<dyn SizingPolicy>,
        universe: Universe,
    ) -> Self {
        Self {
            engine,
            ledger: PositionLedger::new(ledger_config),
            sizing,
            guard: None,
            universe,
            histories: BTreeMap::new(),
            settings: BotSettings::default(),
            rebalance_epoch: 0,
            bars_processed: 0,
            signals_emitted: 0,
        }
    }

    pub fn with_guard(mut self, guard: DayTradeGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_settings(mut self, settings: BotSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn engine(&self) -> &SignalEngine {
        &self.engine
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    pub fn history(&self, symbol: &str) -> Option<&PriceHistory> {
        self.histories.get(symbol)
    }

    pub fn bars_processed(&self) -> usize {
        self.bars_processed
    }

    pub fn signals_emitted(&self) -> usize {
        self.signals_emitted
    }

    /// Most recent observed price per symbol.
    pub fn last_prices(&self) -> BTreeMap<String, f64> {
        self.histories
            .iter()
            .filter_map(|(sym, h)| h.last().map(|p| (sym.clone(), p.price)))
            .collect()
    }

    pub fn metrics(&self, annualization: Annualization) -> Metrics {
        Metrics::compute(self.ledger.trades().records(), annualization)
    }

    /// Record a price without trading on it.
    pub fn seed_history(&mut self, point: PricePoint) -> Result<(), HistoryError> {
        self.history_mut(&point.symbol).push(point)
    }

    /// Process one observed price.
    ///
    /// The open position (if any) is checked against the risk limits first.
    /// A new position is considered only when `allow_entry` is set, the symbol
    /// is flat and nothing was closed for it on this step. The point is
    /// appended to the history after it has been evaluated against the prior
    /// prices.
    pub fn step(
        &mut self,
        point: PricePoint,
        allow_entry: bool,
        rng: &mut dyn RandomSource,
        executor: &mut dyn OrderExecutor,
    ) -> Result<Vec<TickEvent>, HistoryError> {
        let symbol = point.symbol.clone();
        let price = point.price;
        let timestamp = point.timestamp;

        // Window of prior prices, captured before the append validates the point.
        let required = self.engine.required_window();
        let prior = self
            .histories
            .get(&symbol)
            .map(|h| h.window(required))
            .unwrap_or_default();
        self.history_mut(&symbol).push(point)?;
        self.bars_processed += 1;

        if let Some(guard) = self.guard.as_mut() {
            if guard.observe(timestamp.date_naive()) {
                debug!(day = %timestamp.date_naive(), "day-trade counter reset");
            }
        }

        let mut events = Vec::new();

        if let Some(reason) = self.ledger.check_exit(&symbol, price) {
            let event = self.close_position(&symbol, price, timestamp, reason, executor);
            let closed = matches!(event, Some(TickEvent::Closed(_)));
            events.extend(event);
            if closed || self.ledger.has_position(&symbol) {
                return Ok(events);
            }
        }

        if !allow_entry {
            return Ok(events);
        }

        let has_position = self.ledger.has_position(&symbol);
        if has_position && !self.settings.exit_on_opposite_signal {
            return Ok(events);
        }

        let signal = self.engine.signal(price, &prior, rng);
        if signal != Signal::Hold {
            self.signals_emitted += 1;
            debug!(symbol = %symbol, signal = %signal, price, "signal");
        }

        if let Some(side) = self.ledger.position(&symbol).map(|p| p.side) {
            let opposite = matches!(
                (side, signal),
                (PositionSide::Long, Signal::Sell) | (PositionSide::Short, Signal::Buy)
            );
            if opposite {
                events.extend(self.close_position(
                    &symbol,
                    price,
                    timestamp,
                    CloseReason::StrategyExit,
                    executor,
                ));
            }
            return Ok(events);
        }

        events.extend(self.try_open(&symbol, signal, price, timestamp, rng, executor));
        Ok(events)
    }

    /// Whether the closed-trade count has crossed a new multiple of the
    /// rebalance interval since the last rebalance.
    pub fn rebalance_due(&self) -> bool {
        match self.settings.rebalance_every {
            Some(k) if k > 0 => self.ledger.trades().len() / k > self.rebalance_epoch,
            _ => false,
        }
    }

    /// Close every open position at its latest price with REBALANCE.
    pub fn rebalance(
        &mut self,
        timestamp: DateTime<Utc>,
        executor: &mut dyn OrderExecutor,
    ) -> Vec<TickEvent> {
        info!(open = self.ledger.open_count(), "rebalancing");
        let events = self.close_all(timestamp, CloseReason::Rebalance, executor);
        if let Some(k) = self.settings.rebalance_every.filter(|k| *k > 0) {
            self.rebalance_epoch = self.ledger.trades().len() / k;
        }
        events
    }

    /// Force-close every open position at its latest price with END_OF_RUN.
    pub fn liquidate(
        &mut self,
        timestamp: DateTime<Utc>,
        executor: &mut dyn OrderExecutor,
    ) -> Vec<TickEvent> {
        self.close_all(timestamp, CloseReason::EndOfRun, executor)
    }

    pub fn into_ledger(self) -> PositionLedger {
        self.ledger
    }

    fn history_mut(&mut self, symbol: &str) -> &mut PriceHistory {
        self.histories
            .entry(symbol.to_string())
            .or_insert_with(|| PriceHistory::new(symbol))
    }

    fn close_all(
        &mut self,
        timestamp: DateTime<Utc>,
        reason: CloseReason,
        executor: &mut dyn OrderExecutor,
    ) -> Vec<TickEvent> {
        let last = self.last_prices();
        let open: Vec<(String, f64)> = self
            .ledger
            .open_positions()
            .map(|p| {
                let price = last.get(&p.symbol).copied().unwrap_or(p.entry_price);
                (p.symbol.clone(), price)
            })
            .collect();
        let mut events = Vec::with_capacity(open.len());
        for (symbol, price) in open {
            events.extend(self.close_position(&symbol, price, timestamp, reason, executor));
        }
        events
    }

    /// Flatten through the executor. On order failure the position stays open.
    fn close_position(
        &mut self,
        symbol: &str,
        price: f64,
        timestamp: DateTime<Utc>,
        reason: CloseReason,
        executor: &mut dyn OrderExecutor,
    ) -> Option<TickEvent> {
        let (side, quantity) = {
            let position = self.ledger.position(symbol)?;
            (OrderSide::closing(position.side), position.quantity)
        };
        match executor.place_market_order(symbol, side, quantity) {
            Ok(fill) => self
                .ledger
                .close(symbol, fill.price_or(price), timestamp, reason)
                .map(TickEvent::Closed),
            Err(error) => {
                warn!(symbol, %side, %reason, error = %error, "close order failed, position kept");
                Some(TickEvent::OrderFailed {
                    symbol: symbol.to_string(),
                    side,
                    error,
                })
            }
        }
    }

    fn try_open(
        &mut self,
        symbol: &str,
        signal: Signal,
        price: f64,
        timestamp: DateTime<Utc>,
        rng: &mut dyn RandomSource,
        executor: &mut dyn OrderExecutor,
    ) -> Option<TickEvent> {
        let side = match signal {
            Signal::Buy => PositionSide::Long,
            Signal::Sell if self.settings.allow_short => PositionSide::Short,
            _ => return None,
        };

        let class = self.universe.class_of(symbol);
        if let Some(guard) = &self.guard {
            if !guard.permits(class) {
                info!(symbol, %signal, "entry suppressed by day-trade guard");
                return Some(TickEvent::Suppressed {
                    symbol: symbol.to_string(),
                    signal,
                });
            }
        }

        let quantity = self
            .sizing
            .quantity(price, self.ledger.available_balance(), rng);
        if !(quantity.is_finite() && quantity > 0.0) {
            debug!(symbol, sizer = self.sizing.name(), "sizer returned zero quantity");
            return None;
        }

        let order_side = OrderSide::opening(side);
        let fill = match executor.place_market_order(symbol, order_side, quantity) {
            Ok(fill) => fill,
            Err(error) => {
                warn!(symbol, side = %order_side, error = %error, "entry order failed");
                return Some(TickEvent::OrderFailed {
                    symbol: symbol.to_string(),
                    side: order_side,
                    error,
                });
            }
        };

        let position = Position::new(symbol, side, quantity, fill.price_or(price), timestamp);
        if let Err(e) = self.ledger.open(position.clone()) {
            warn!(symbol, error = %e, "ledger rejected position");
            return None;
        }
        if let Some(guard) = self.guard.as_mut() {
            guard.record_entry(class);
        }
        Some(TickEvent::Opened(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssetClass;
    use crate::feed::SimulatedExecutor;
    use crate::ledger::{FixedQuantity, RiskLimits};
    use crate::rng::ScriptedRandom;
    use crate::signals::{Strategy, ThresholdProfile};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn bot(universe: Universe) -> BotState {
        let engine = SignalEngine::with_profile(Strategy::Momentum, ThresholdProfile::Simulated);
        let config = LedgerConfig::new(RiskLimits::from_percent(5.0, 10.0).unwrap());
        BotState::new(engine, config, Box::new(FixedQuantity::new(2.0)), universe)
    }

    fn point(sym: &str, minutes: i64, price: f64) -> PricePoint {
        PricePoint::new(t0() + Duration::minutes(minutes), sym, price)
    }

    /// Seed five flat prices so momentum has its lookback.
    fn seeded(universe: Universe, sym: &str) -> BotState {
        let mut b = bot(universe);
        for i in 0..5 {
            b.seed_history(point(sym, i, 100.0)).unwrap();
        }
        b
    }

    #[test]
    fn rising_price_opens_long() {
        let mut b = seeded(Universe::new(), "BTC");
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        let events = b.step(point("BTC", 5, 101.0), true, &mut rng, &mut exec).unwrap();
        assert!(matches!(&events[..], [TickEvent::Opened(p)] if p.side == PositionSide::Long));
        assert_eq!(b.ledger().position("BTC").unwrap().quantity, 2.0);
        assert_eq!(b.history("BTC").unwrap().len(), 6);
    }

    #[test]
    fn short_history_holds_without_draw() {
        let mut b = bot(Universe::new());
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        let events = b.step(point("BTC", 0, 100.0), true, &mut rng, &mut exec).unwrap();
        assert!(events.is_empty());
        assert_eq!(rng.consumed(), 0);
    }

    #[test]
    fn stop_loss_then_no_reentry_same_step() {
        let mut b = seeded(Universe::new(), "BTC");
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        b.step(point("BTC", 5, 101.0), true, &mut rng, &mut exec).unwrap();
        let events = b.step(point("BTC", 6, 90.0), true, &mut rng, &mut exec).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            TickEvent::Closed(r) => assert_eq!(r.reason, CloseReason::StopLoss),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!b.ledger().has_position("BTC"));
    }

    #[test]
    fn long_only_ignores_sell() {
        let mut b = seeded(Universe::new(), "BTC").with_settings(BotSettings {
            allow_short: false,
            ..BotSettings::default()
        });
        let mut rng = ScriptedRandom::constant(0.1);
        let mut exec = SimulatedExecutor::new();
        let events = b.step(point("BTC", 5, 99.0), true, &mut rng, &mut exec).unwrap();
        assert!(events.is_empty());
        assert_eq!(b.signals_emitted(), 1);
    }

    #[test]
    fn day_trade_guard_suppresses_second_equity_entry() {
        let universe = Universe::new()
            .with("AAA", AssetClass::Equity)
            .with("BBB", AssetClass::Equity);
        let mut b = bot(universe).with_guard(DayTradeGuard::new(1));
        for i in 0..5 {
            b.seed_history(point("AAA", i, 100.0)).unwrap();
            b.seed_history(point("BBB", i, 100.0)).unwrap();
        }
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        let first = b.step(point("AAA", 10, 101.0), true, &mut rng, &mut exec).unwrap();
        assert!(matches!(first[..], [TickEvent::Opened(_)]));
        let second = b.step(point("BBB", 11, 101.0), true, &mut rng, &mut exec).unwrap();
        assert!(matches!(&second[..], [TickEvent::Suppressed { symbol, .. }] if symbol == "BBB"));

        // Next calendar day resets the counter.
        let next_day = PricePoint::new(t0() + Duration::days(1), "BBB", 101.0);
        let third = b.step(next_day, true, &mut rng, &mut exec).unwrap();
        assert!(matches!(third[..], [TickEvent::Opened(_)]));
    }

    #[test]
    fn out_of_order_point_rejected() {
        let mut b = seeded(Universe::new(), "BTC");
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        let err = b
            .step(point("BTC", 1, 101.0), true, &mut rng, &mut exec)
            .unwrap_err();
        assert!(matches!(err, HistoryError::OutOfOrder { .. }));
        assert_eq!(b.bars_processed(), 0);
    }

    #[test]
    fn opposite_signal_exit_when_enabled() {
        let mut b = seeded(Universe::new(), "BTC").with_settings(BotSettings {
            exit_on_opposite_signal: true,
            ..BotSettings::default()
        });
        let mut exec = SimulatedExecutor::new();
        b.step(point("BTC", 5, 101.0), true, &mut ScriptedRandom::constant(0.9), &mut exec)
            .unwrap();
        // Reference price 5 steps back is 100; 99 fell and draw 0.1 < 0.4.
        let events = b
            .step(point("BTC", 6, 99.0), true, &mut ScriptedRandom::constant(0.1), &mut exec)
            .unwrap();
        match &events[..] {
            [TickEvent::Closed(r)] => assert_eq!(r.reason, CloseReason::StrategyExit),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn rebalance_triggers_once_per_multiple() {
        let mut b = seeded(Universe::new(), "BTC").with_settings(BotSettings {
            rebalance_every: Some(1),
            ..BotSettings::default()
        });
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        assert!(!b.rebalance_due());
        b.step(point("BTC", 5, 101.0), true, &mut rng, &mut exec).unwrap();
        b.step(point("BTC", 6, 120.0), true, &mut rng, &mut exec).unwrap();
        assert_eq!(b.ledger().trades().len(), 1);
        assert!(b.rebalance_due());
        b.rebalance(t0(), &mut exec);
        assert!(!b.rebalance_due());
    }

    #[test]
    fn liquidate_closes_at_last_price() {
        let mut b = seeded(Universe::new(), "BTC");
        let mut rng = ScriptedRandom::constant(0.9);
        let mut exec = SimulatedExecutor::new();
        b.step(point("BTC", 5, 101.0), true, &mut rng, &mut exec).unwrap();
        b.seed_history(point("BTC", 6, 103.0)).unwrap();
        let events = b.liquidate(t0() + Duration::minutes(7), &mut exec);
        match &events[..] {
            [TickEvent::Closed(r)] => {
                assert_eq!(r.reason, CloseReason::EndOfRun);
                assert_eq!(r.exit_price, 103.0);
                assert!((r.pnl - 4.0).abs() < 1e-9);
            }
            other => panic!("unexpected events {other:?}"),
        }
    }
}
