//! Fixed-percent stop-loss / take-profit limits.
//!
//! Limits are measured as the favourable move from entry:
//! long = (current - entry) / entry, short = (entry - current) / entry.
//! The stop is checked first, so at most one exit fires per evaluation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CloseReason, Position};

#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("stop_loss_pct must be positive and finite, got {0}")]
    StopLoss(f64),
    #[error("take_profit_pct must be positive and finite, got {0}")]
    TakeProfit(f64),
}

/// Stop-loss and take-profit thresholds as fractions (0.05 = 5%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    stop_loss: f64,
    take_profit: f64,
}

impl RiskLimits {
    /// Build from percentages as entered by the user (5.0 = 5%).
    pub fn from_percent(stop_loss_pct: f64, take_profit_pct: f64) -> Result<Self, RiskError> {
        if !(stop_loss_pct.is_finite() && stop_loss_pct > 0.0) {
            return Err(RiskError::StopLoss(stop_loss_pct));
        }
        if !(take_profit_pct.is_finite() && take_profit_pct > 0.0) {
            return Err(RiskError::TakeProfit(take_profit_pct));
        }
        Ok(Self {
            stop_loss: stop_loss_pct / 100.0,
            take_profit: take_profit_pct / 100.0,
        })
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    /// Exit reason triggered by `current_price`, if any.
    pub fn evaluate(&self, position: &Position, current_price: f64) -> Option<CloseReason> {
        let mv = position.favorable_move(current_price);
        if mv <= -self.stop_loss {
            Some(CloseReason::StopLoss)
        } else if mv >= self.take_profit {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }
}
