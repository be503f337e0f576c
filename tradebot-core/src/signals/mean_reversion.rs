//! Mean reversion: fade moves that stretch too far from the window mean.
//!
//! BUY when the current price sits more than `band` below the mean and the draw
//! is under `buy_below`; SELL when it sits more than `band` above the mean and
//! the draw clears `sell_above`.

use serde::{Deserialize, Serialize};

use super::{tail, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanReversionParams {
    pub lookback: usize,
    /// Distance from the mean, as a fraction (0.05 = 5%).
    pub band: f64,
    pub buy_below: f64,
    pub sell_above: f64,
}

impl MeanReversionParams {
    pub fn simulated() -> Self {
        Self {
            lookback: 10,
            band: 0.05,
            buy_below: 0.4,
            sell_above: 0.6,
        }
    }

    pub fn live() -> Self {
        Self {
            lookback: 15,
            band: 0.02,
            buy_below: 0.45,
            sell_above: 0.55,
        }
    }
}

pub fn evaluate(
    params: &MeanReversionParams,
    current_price: f64,
    history: &[f64],
    draw: f64,
) -> Signal {
    let Some(window) = tail(history, params.lookback) else {
        return Signal::Hold;
    };
    let mean = window.iter().sum::<f64>() / window.len() as f64;

    if current_price < mean * (1.0 - params.band) && draw < params.buy_below {
        Signal::Buy
    } else if current_price > mean * (1.0 + params.band) && draw > params.sell_above {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
