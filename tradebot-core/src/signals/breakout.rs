//! Breakout: price escapes the high/low range of the lookback window.
//!
//! BUY when the current price exceeds `max(window) * (1 + margin)` and the draw
//! clears `buy_above`; SELL when it drops below `min(window) * (1 - margin)`
//! and the draw is under `sell_below`.

use serde::{Deserialize, Serialize};

use super::{tail, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutParams {
    pub lookback: usize,
    /// Buffer beyond the channel edge, as a fraction (0.01 = 1%).
    pub margin: f64,
    pub buy_above: f64,
    pub sell_below: f64,
}

impl BreakoutParams {
    pub fn simulated() -> Self {
        Self {
            lookback: 20,
            margin: 0.0,
            buy_above: 0.7,
            sell_below: 0.3,
        }
    }

    pub fn live() -> Self {
        Self {
            lookback: 20,
            margin: 0.01,
            buy_above: 0.7,
            sell_below: 0.3,
        }
    }
}

pub fn evaluate(params: &BreakoutParams, current_price: f64, history: &[f64], draw: f64) -> Signal {
    let Some(window) = tail(history, params.lookback) else {
        return Signal::Hold;
    };
    let high = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().copied().fold(f64::INFINITY, f64::min);

    if current_price > high * (1.0 + params.margin) && draw > params.buy_above {
        Signal::Buy
    } else if current_price < low * (1.0 - params.margin) && draw < params.sell_below {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
