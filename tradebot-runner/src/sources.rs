//! Price sources for the live loop.

use std::collections::{BTreeMap, VecDeque};

use tradebot_core::feed::{PriceError, PriceSource};
use tradebot_core::rng::RandomSource;

use crate::data_loader::SeriesMap;

/// Replays pre-recorded prices, one per request, per symbol.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    queues: BTreeMap<String, VecDeque<f64>>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: &SeriesMap) -> Self {
        let queues = series
            .iter()
            .map(|(sym, points)| (sym.clone(), points.iter().map(|p| p.price).collect()))
            .collect();
        Self { queues }
    }

    pub fn with_prices(mut self, symbol: &str, prices: impl IntoIterator<Item = f64>) -> Self {
        self.queues
            .entry(symbol.to_string())
            .or_default()
            .extend(prices);
        self
    }

    pub fn remaining(&self, symbol: &str) -> usize {
        self.queues.get(symbol).map_or(0, VecDeque::len)
    }
}

impl PriceSource for ReplaySource {
    fn get_price(&mut self, symbol: &str) -> Result<f64, PriceError> {
        let queue = self
            .queues
            .get_mut(symbol)
            .ok_or_else(|| PriceError::Unavailable(symbol.to_string()))?;
        queue
            .pop_front()
            .ok_or_else(|| PriceError::Exhausted(symbol.to_string()))
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Paper feed: each request moves the symbol's price by a uniform step in
/// `[-max_step, +max_step)`.
pub struct RandomWalkSource {
    prices: BTreeMap<String, f64>,
    max_step: f64,
    rng: Box<dyn RandomSource>,
}

impl RandomWalkSource {
    pub fn new(
        start_prices: impl IntoIterator<Item = (String, f64)>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            prices: start_prices.into_iter().collect(),
            max_step: 0.05,
            rng,
        }
    }

    pub fn with_max_step(mut self, max_step: f64) -> Self {
        self.max_step = max_step;
        self
    }

    pub fn current(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }
}

impl PriceSource for RandomWalkSource {
    fn get_price(&mut self, symbol: &str) -> Result<f64, PriceError> {
        let step = (self.rng.next_unit() * 2.0 - 1.0) * self.max_step;
        let price = self
            .prices
            .get_mut(symbol)
            .ok_or_else(|| PriceError::Unavailable(symbol.to_string()))?;
        let next = *price * (1.0 + step);
        if !(next.is_finite() && next > 0.0) {
            return Err(PriceError::Invalid {
                symbol: symbol.to_string(),
                price: next,
            });
        }
        *price = next;
        Ok(next)
    }

    fn name(&self) -> &str {
        "random_walk"
    }
}
