//! Collaborator interfaces: where prices come from and where orders go.
//!
//! Both traits are synchronous and object-safe; a driver owns one boxed
//! implementation of each.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PositionSide;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceError {
    /// No price for this symbol this tick; the caller skips it.
    #[error("no price available for '{0}'")]
    Unavailable(String),
    #[error("price feed exhausted for '{0}'")]
    Exhausted(String),
    #[error("invalid price {price} for '{symbol}'")]
    Invalid { symbol: String, price: f64 },
}

/// Latest-price lookup.
pub trait PriceSource: Send {
    fn get_price(&mut self, symbol: &str) -> Result<f64, PriceError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order side that opens a position on `side`.
    pub fn opening(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Buy,
            PositionSide::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens a position on `side`.
    pub fn closing(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Accepted market order. `fill_price` is `None` when the venue does not
/// report one; callers then use the price they requested at.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrderFill {
    pub fill_price: Option<f64>,
}

impl OrderFill {
    pub fn price_or(&self, requested: f64) -> f64 {
        match self.fill_price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => requested,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("order rejected for '{symbol}': {reason}")]
    Rejected { symbol: String, reason: String },
    #[error("execution venue unavailable: {0}")]
    Unavailable(String),
}

/// Market-order placement.
pub trait OrderExecutor: Send {
    fn place_market_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderFill, ExecutionError>;

    fn name(&self) -> &str;
}

/// Paper executor: accepts every order, reports no fill price.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    orders_placed: usize,
}

impl SimulatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders_placed(&self) -> usize {
        self.orders_placed
    }
}

impl OrderExecutor for SimulatedExecutor {
    fn place_market_order(
        &mut self,
        _symbol: &str,
        _side: OrderSide,
        _quantity: f64,
    ) -> Result<OrderFill, ExecutionError> {
        self.orders_placed += 1;
        Ok(OrderFill::default())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_side_is_opposite() {
        assert_eq!(OrderSide::opening(PositionSide::Long), OrderSide::Buy);
        assert_eq!(OrderSide::closing(PositionSide::Long), OrderSide::Sell);
        assert_eq!(OrderSide::opening(PositionSide::Short), OrderSide::Sell);
        assert_eq!(OrderSide::closing(PositionSide::Short), OrderSide::Buy);
    }

    #[test]
    fn fill_price_fallback() {
        assert_eq!(OrderFill::default().price_or(101.0), 101.0);
        assert_eq!(OrderFill { fill_price: Some(100.5) }.price_or(101.0), 100.5);
        assert_eq!(OrderFill { fill_price: Some(-1.0) }.price_or(101.0), 101.0);
    }

    #[test]
    fn simulated_executor_accepts_everything() {
        let mut exec = SimulatedExecutor::new();
        let fill = exec.place_market_order("BTC", OrderSide::Buy, 0.5).unwrap();
        assert_eq!(fill.fill_price, None);
        exec.place_market_order("BTC", OrderSide::Sell, 0.5).unwrap();
        assert_eq!(exec.orders_placed(), 2);
    }
}
