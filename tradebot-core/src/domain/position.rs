use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// An open, unrealized exposure in one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        quantity: f64,
        entry_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            entry_price,
            entry_time,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == PositionSide::Short
    }

    /// Fractional move from entry in the position's favour.
    ///
    /// Long: (current - entry) / entry. Short: (entry - current) / entry.
    pub fn favorable_move(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        match self.side {
            PositionSide::Long => (current_price - self.entry_price) / self.entry_price,
            PositionSide::Short => (self.entry_price - current_price) / self.entry_price,
        }
    }

    /// Gross P/L if closed at `current_price`, before fees.
    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        match self.side {
            PositionSide::Long => (current_price - self.entry_price) * self.quantity,
            PositionSide::Short => (self.entry_price - current_price) * self.quantity,
        }
    }

    /// Capital committed at entry.
    pub fn cost_basis(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long(entry: f64) -> Position {
        Position::new("SPY", PositionSide::Long, 10.0, entry, Utc::now())
    }

    #[test]
    fn long_move_and_pnl() {
        let pos = long(100.0);
        assert!((pos.favorable_move(94.0) - (-0.06)).abs() < 1e-12);
        assert!((pos.unrealized_pnl(94.0) - (-60.0)).abs() < 1e-12);
    }

    #[test]
    fn short_move_and_pnl() {
        let pos = Position::new("SPY", PositionSide::Short, 10.0, 100.0, Utc::now());
        assert!((pos.favorable_move(94.0) - 0.06).abs() < 1e-12);
        assert!((pos.unrealized_pnl(94.0) - 60.0).abs() < 1e-12);
        assert!(pos.is_short());
    }

    #[test]
    fn cost_basis() {
        assert_eq!(long(50.0).cost_basis(), 500.0);
    }
}
