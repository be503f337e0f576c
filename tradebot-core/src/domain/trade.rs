//! TradeRecord (one closed round-trip trade) and the append-only TradeLog.

use super::position::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    StrategyExit,
    Rebalance,
    EndOfRun,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::StopLoss => "STOP_LOSS",
            CloseReason::TakeProfit => "TAKE_PROFIT",
            CloseReason::StrategyExit => "STRATEGY_EXIT",
            CloseReason::Rebalance => "REBALANCE",
            CloseReason::EndOfRun => "END_OF_RUN",
        };
        write!(f, "{s}")
    }
}

/// Immutable log entry for a closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub closed_at: DateTime<Utc>,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,

    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,

    /// Round-trip fee already deducted from `pnl`.
    pub fee: f64,
    /// Realized P/L, net of fee.
    pub pnl: f64,
    /// Running sum of `pnl` up to and including this trade.
    pub cumulative_pnl: f64,

    pub reason: CloseReason,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < 0.0
    }

    /// Return on the trade as a fraction of entry cost.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 || self.quantity == 0.0 {
            return 0.0;
        }
        self.pnl / (self.entry_price * self.quantity)
    }
}

/// Append-only sequence of closed trades in closing order.
///
/// The log owns the running total: `append` overwrites the record's
/// `cumulative_pnl` so that every entry equals the previous cumulative value
/// plus its own `pnl`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeLog {
    records: Vec<TradeRecord>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, mut record: TradeRecord) -> &TradeRecord {
        record.cumulative_pnl = self.total_pnl() + record.pnl;
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Concatenate several logs in the given order, recomputing running totals.
    pub fn merge(logs: impl IntoIterator<Item = TradeLog>) -> Self {
        let mut merged = TradeLog::new();
        for log in logs {
            for record in log.records {
                merged.append(record);
            }
        }
        merged
    }

    pub fn total_pnl(&self) -> f64 {
        self.records.last().map_or(0.0, |r| r.cumulative_pnl)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TradeRecord> {
        self.records
    }
}
