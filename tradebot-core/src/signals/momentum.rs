//! Momentum: compare the current price to the price `lookback` steps back.
//!
//! BUY when the price rose and the draw clears `buy_above`; SELL when it fell
//! and the draw is under `sell_below`. An unchanged price holds.

use serde::{Deserialize, Serialize};

use super::{tail, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumParams {
    pub lookback: usize,
    pub buy_above: f64,
    pub sell_below: f64,
}

impl MomentumParams {
    pub fn simulated() -> Self {
        Self {
            lookback: 5,
            buy_above: 0.6,
            sell_below: 0.4,
        }
    }

    pub fn live() -> Self {
        Self {
            lookback: 10,
            buy_above: 0.5,
            sell_below: 0.5,
        }
    }
}

pub fn evaluate(params: &MomentumParams, current_price: f64, history: &[f64], draw: f64) -> Signal {
    let Some(window) = tail(history, params.lookback) else {
        return Signal::Hold;
    };
    let change = current_price - window[0];
    if change > 0.0 && draw > params.buy_above {
        Signal::Buy
    } else if change < 0.0 && draw < params.sell_below {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
