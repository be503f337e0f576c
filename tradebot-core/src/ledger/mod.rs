//! PositionLedger: open positions keyed by symbol plus the closed-trade log.
//!
//! At most one position per symbol. Every close produces exactly one
//! [`TradeRecord`]; the log maintains the running P/L total.

pub mod day_trade;
pub mod risk;
pub mod sizing;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{CloseReason, Position, TradeLog, TradeRecord};

pub use day_trade::DayTradeGuard;
pub use risk::{RiskError, RiskLimits};
pub use sizing::{BalanceFraction, FixedQuantity, RandomShares, SizingPolicy};

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("position already open for '{0}'")]
    AlreadyOpen(String),
    #[error("invalid quantity {quantity} for '{symbol}'")]
    InvalidQuantity { symbol: String, quantity: f64 },
    #[error("invalid entry price {price} for '{symbol}'")]
    InvalidPrice { symbol: String, price: f64 },
}

/// Static ledger parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub risk: RiskLimits,
    /// Per-side fee as a fraction of notional (0.001 = 10 bps).
    pub fee_rate: f64,
    pub initial_balance: f64,
}

impl LedgerConfig {
    pub fn new(risk: RiskLimits) -> Self {
        Self {
            risk,
            fee_rate: 0.0,
            initial_balance: 10_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionLedger {
    config: LedgerConfig,
    positions: BTreeMap<String, Position>,
    trades: TradeLog,
}

impl PositionLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            positions: BTreeMap::new(),
            trades: TradeLog::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Open positions in symbol order.
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Exit reason the risk limits would trigger at `price`, without closing.
    pub fn check_exit(&self, symbol: &str, price: f64) -> Option<CloseReason> {
        let position = self.positions.get(symbol)?;
        self.config.risk.evaluate(position, price)
    }

    /// Apply the risk limits to the open position in `symbol` and close it if
    /// one fires.
    pub fn on_tick(
        &mut self,
        symbol: &str,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Option<TradeRecord> {
        let reason = self.check_exit(symbol, price)?;
        self.close(symbol, price, timestamp, reason)
    }

    pub fn open(&mut self, position: Position) -> Result<(), LedgerError> {
        if self.positions.contains_key(&position.symbol) {
            return Err(LedgerError::AlreadyOpen(position.symbol));
        }
        if !(position.quantity.is_finite() && position.quantity > 0.0) {
            return Err(LedgerError::InvalidQuantity {
                symbol: position.symbol,
                quantity: position.quantity,
            });
        }
        if !(position.entry_price.is_finite() && position.entry_price > 0.0) {
            return Err(LedgerError::InvalidPrice {
                symbol: position.symbol,
                price: position.entry_price,
            });
        }
        info!(
            symbol = %position.symbol,
            side = %position.side,
            quantity = position.quantity,
            price = position.entry_price,
            "opened position"
        );
        self.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    /// Close the position in `symbol` at `exit_price`. `None` if flat.
    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: f64,
        timestamp: DateTime<Utc>,
        reason: CloseReason,
    ) -> Option<TradeRecord> {
        let position = self.positions.remove(symbol)?;
        let gross = position.unrealized_pnl(exit_price);
        let fee = self.config.fee_rate * position.quantity * (position.entry_price + exit_price);
        let record = TradeRecord {
            closed_at: timestamp,
            symbol: position.symbol,
            side: position.side,
            quantity: position.quantity,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_price,
            fee,
            pnl: gross - fee,
            cumulative_pnl: 0.0,
            reason,
        };
        let logged = self.trades.append(record).clone();
        info!(
            symbol = %logged.symbol,
            side = %logged.side,
            reason = %logged.reason,
            exit_price = logged.exit_price,
            pnl = logged.pnl,
            cumulative_pnl = logged.cumulative_pnl,
            "closed position"
        );
        Some(logged)
    }

    /// Close every open position at its last known price.
    ///
    /// Positions without a price in `last_prices` are closed at entry (zero
    /// gross P/L).
    pub fn close_all(
        &mut self,
        last_prices: &BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
        reason: CloseReason,
    ) -> Vec<TradeRecord> {
        let symbols: Vec<String> = self.positions.keys().cloned().collect();
        let mut closed = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let price = match last_prices.get(&symbol) {
                Some(p) => *p,
                None => {
                    debug!(symbol = %symbol, "no last price, closing at entry");
                    self.positions[&symbol].entry_price
                }
            };
            if let Some(record) = self.close(&symbol, price, timestamp, reason) {
                closed.push(record);
            }
        }
        closed
    }

    pub fn liquidate_all(
        &mut self,
        last_prices: &BTreeMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> Vec<TradeRecord> {
        self.close_all(last_prices, timestamp, CloseReason::EndOfRun)
    }

    pub fn trades(&self) -> &TradeLog {
        &self.trades
    }

    pub fn realized_pnl(&self) -> f64 {
        self.trades.total_pnl()
    }

    /// Initial balance plus realized P/L minus capital tied up in open
    /// positions.
    pub fn available_balance(&self) -> f64 {
        let committed: f64 = self.positions.values().map(Position::cost_basis).sum();
        self.config.initial_balance + self.realized_pnl() - committed
    }

    /// Unrealized P/L across all open positions at the given marks.
    pub fn unrealized_pnl(&self, marks: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|p| {
                let mark = marks.get(&p.symbol).copied().unwrap_or(p.entry_price);
                p.unrealized_pnl(mark)
            })
            .sum()
    }

    pub fn into_trades(self) -> TradeLog {
        self.trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionSide;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, 0, 0).unwrap()
    }

    fn ledger(fee_rate: f64) -> PositionLedger {
        let mut config = LedgerConfig::new(RiskLimits::from_percent(5.0, 10.0).unwrap());
        config.fee_rate = fee_rate;
        PositionLedger::new(config)
    }

    fn long(symbol: &str, qty: f64, entry: f64) -> Position {
        Position::new(symbol, PositionSide::Long, qty, entry, ts(0))
    }

    #[test]
    fn stop_loss_closes_long() {
        let mut l = ledger(0.0);
        l.open(long("AAA", 3.0, 100.0)).unwrap();
        let record = l.on_tick("AAA", 94.0, ts(1)).unwrap();
        assert_eq!(record.reason, CloseReason::StopLoss);
        assert!((record.pnl - (-18.0)).abs() < 1e-9);
        assert!(!l.has_position("AAA"));
    }

    #[test]
    fn take_profit_closes_short() {
        let mut l = ledger(0.0);
        l.open(Position::new("BBB", PositionSide::Short, 2.0, 100.0, ts(0)))
            .unwrap();
        let record = l.on_tick("BBB", 89.0, ts(1)).unwrap();
        assert_eq!(record.reason, CloseReason::TakeProfit);
        assert!((record.pnl - 22.0).abs() < 1e-9);
    }

    #[test]
    fn quiet_tick_keeps_position() {
        let mut l = ledger(0.0);
        l.open(long("AAA", 1.0, 100.0)).unwrap();
        assert!(l.on_tick("AAA", 101.0, ts(1)).is_none());
        assert!(l.has_position("AAA"));
        assert!(l.on_tick("ZZZ", 1.0, ts(1)).is_none());
    }

    #[test]
    fn second_open_same_symbol_rejected() {
        let mut l = ledger(0.0);
        l.open(long("AAA", 1.0, 100.0)).unwrap();
        assert_eq!(
            l.open(long("AAA", 2.0, 101.0)),
            Err(LedgerError::AlreadyOpen("AAA".into()))
        );
        assert_eq!(l.position("AAA").unwrap().quantity, 1.0);
    }

    #[test]
    fn rejects_bad_quantity_and_price() {
        let mut l = ledger(0.0);
        assert!(matches!(
            l.open(long("AAA", 0.0, 100.0)),
            Err(LedgerError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            l.open(long("AAA", 1.0, -1.0)),
            Err(LedgerError::InvalidPrice { .. })
        ));
        assert_eq!(l.open_count(), 0);
    }

    #[test]
    fn fees_reduce_pnl() {
        let mut l = ledger(0.001);
        l.open(long("AAA", 10.0, 100.0)).unwrap();
        let record = l.close("AAA", 110.0, ts(1), CloseReason::StrategyExit).unwrap();
        // gross 100, fee 0.001 * 10 * 210 = 2.1
        assert!((record.fee - 2.1).abs() < 1e-9);
        assert!((record.pnl - 97.9).abs() < 1e-9);
    }

    #[test]
    fn cumulative_pnl_runs() {
        let mut l = ledger(0.0);
        l.open(long("AAA", 1.0, 100.0)).unwrap();
        l.open(long("BBB", 1.0, 50.0)).unwrap();
        l.close("AAA", 90.0, ts(1), CloseReason::StopLoss);
        let r = l.close("BBB", 60.0, ts(2), CloseReason::TakeProfit).unwrap();
        assert!((r.cumulative_pnl - 0.0).abs() < 1e-9);
        assert_eq!(l.trades().len(), 2);
    }

    #[test]
    fn available_balance_tracks_commitments() {
        let mut l = ledger(0.0);
        assert_eq!(l.available_balance(), 10_000.0);
        l.open(long("AAA", 10.0, 100.0)).unwrap();
        assert_eq!(l.available_balance(), 9_000.0);
        l.close("AAA", 105.0, ts(1), CloseReason::StrategyExit);
        assert!((l.available_balance() - 10_050.0).abs() < 1e-9);
    }

    #[test]
    fn liquidate_all_uses_end_of_run() {
        let mut l = ledger(0.0);
        l.open(long("AAA", 1.0, 100.0)).unwrap();
        l.open(long("BBB", 1.0, 50.0)).unwrap();
        let mut last = BTreeMap::new();
        last.insert("AAA".to_string(), 102.0);
        let closed = l.liquidate_all(&last, ts(3));
        assert_eq!(closed.len(), 2);
        assert!(closed.iter().all(|r| r.reason == CloseReason::EndOfRun));
        assert_eq!(closed[0].symbol, "AAA");
        assert!((closed[0].pnl - 2.0).abs() < 1e-9);
        assert_eq!(closed[1].pnl, 0.0);
        assert_eq!(l.open_count(), 0);
    }

    #[test]
    fn unrealized_pnl_at_marks() {
        let mut l = ledger(0.0);
        l.open(long("AAA", 2.0, 100.0)).unwrap();
        let mut marks = BTreeMap::new();
        marks.insert("AAA".to_string(), 103.0);
        assert!((l.unrealized_pnl(&marks) - 6.0).abs() < 1e-9);
    }
}
