//! PricePoint and PriceHistory: the observed price series per instrument.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single observed price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, symbol: impl Into<String>, price: f64) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            price,
        }
    }

    /// A usable price is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("price point for '{got}' appended to history of '{expected}'")]
    SymbolMismatch { expected: String, got: String },

    #[error("non-positive or non-finite price {price} for '{symbol}'")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("out-of-order timestamp for '{symbol}': {timestamp} is before {last}")]
    OutOfOrder {
        symbol: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}

/// Append-only, chronologically ordered prices for a single symbol.
///
/// Timestamps are non-decreasing; an append that would move time backwards is
/// rejected and leaves the history untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            points: Vec::new(),
        }
    }

    /// Build a history from an already ordered series of points.
    pub fn from_points(
        symbol: impl Into<String>,
        points: impl IntoIterator<Item = PricePoint>,
    ) -> Result<Self, HistoryError> {
        let mut history = Self::new(symbol);
        for point in points {
            history.push(point)?;
        }
        Ok(history)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn push(&mut self, point: PricePoint) -> Result<(), HistoryError> {
        if point.symbol != self.symbol {
            return Err(HistoryError::SymbolMismatch {
                expected: self.symbol.clone(),
                got: point.symbol,
            });
        }
        if !point.is_valid() {
            return Err(HistoryError::InvalidPrice {
                symbol: point.symbol,
                price: point.price,
            });
        }
        if let Some(last) = self.points.last() {
            if point.timestamp < last.timestamp {
                return Err(HistoryError::OutOfOrder {
                    symbol: point.symbol,
                    timestamp: point.timestamp,
                    last: last.timestamp,
                });
            }
        }
        self.points.push(point);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// All prices, oldest first.
    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    /// The most recent `n` prices (fewer if the history is shorter).
    pub fn window(&self, n: usize) -> Vec<f64> {
        let start = self.points.len().saturating_sub(n);
        self.points[start..].iter().map(|p| p.price).collect()
    }
}
