//! Signal generation: maps a price and its recent history to BUY/SELL/HOLD.
//!
//! Each strategy tests a price condition over a lookback window and then gates
//! it with one uniform draw from the injected [`RandomSource`]. The draw is part
//! of the decision rule: with a fixed draw sequence the engine is fully
//! deterministic.
//!
//! Signals are portfolio-agnostic: they see prices only, never positions.

pub mod breakout;
pub mod mean_reversion;
pub mod momentum;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::rng::RandomSource;

pub use breakout::BreakoutParams;
pub use mean_reversion::MeanReversionParams;
pub use momentum::MomentumParams;

/// Trading decision for one instrument at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Named strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Momentum,
    Breakout,
    MeanReversion,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Momentum,
        Strategy::Breakout,
        Strategy::MeanReversion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Momentum => "momentum",
            Strategy::Breakout => "breakout",
            Strategy::MeanReversion => "mean_reversion",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown strategy '{0}'. Valid: momentum, breakout, mean_reversion")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "momentum" => Ok(Strategy::Momentum),
            "breakout" => Ok(Strategy::Breakout),
            "mean_reversion" | "meanreversion" => Ok(Strategy::MeanReversion),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

/// Named threshold sets.
///
/// `Simulated` matches the synthetic-history bot; `Live` is the variant used
/// against a live broker feed (longer lookbacks, tighter bands, even odds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdProfile {
    #[default]
    Simulated,
    Live,
}

/// Parameters for all three strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    pub momentum: MomentumParams,
    pub breakout: BreakoutParams,
    pub mean_reversion: MeanReversionParams,
}

impl SignalParams {
    pub fn for_profile(profile: ThresholdProfile) -> Self {
        match profile {
            ThresholdProfile::Simulated => Self {
                momentum: MomentumParams::simulated(),
                breakout: BreakoutParams::simulated(),
                mean_reversion: MeanReversionParams::simulated(),
            },
            ThresholdProfile::Live => Self {
                momentum: MomentumParams::live(),
                breakout: BreakoutParams::live(),
                mean_reversion: MeanReversionParams::live(),
            },
        }
    }
}

impl Default for SignalParams {
    fn default() -> Self {
        Self::for_profile(ThresholdProfile::Simulated)
    }
}

/// Stateless signal evaluator for one configured strategy.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    strategy: Strategy,
    params: SignalParams,
}

impl SignalEngine {
    pub fn new(strategy: Strategy, params: SignalParams) -> Self {
        Self { strategy, params }
    }

    pub fn with_profile(strategy: Strategy, profile: ThresholdProfile) -> Self {
        Self::new(strategy, SignalParams::for_profile(profile))
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// History length the configured strategy needs before it can fire.
    pub fn required_window(&self) -> usize {
        match self.strategy {
            Strategy::Momentum => self.params.momentum.lookback,
            Strategy::Breakout => self.params.breakout.lookback,
            Strategy::MeanReversion => self.params.mean_reversion.lookback,
        }
    }

    /// Decide for `current_price` given the prices observed before it.
    ///
    /// A short history returns HOLD without consuming a draw; otherwise exactly
    /// one draw is taken from `rng`.
    pub fn signal(
        &self,
        current_price: f64,
        history: &[f64],
        rng: &mut dyn RandomSource,
    ) -> Signal {
        if history.len() < self.required_window() || !current_price.is_finite() {
            return Signal::Hold;
        }
        let draw = rng.next_unit();
        self.signal_with_draw(current_price, history, draw)
    }

    /// Same as [`signal`](Self::signal) with an explicit confirmation draw.
    pub fn signal_with_draw(&self, current_price: f64, history: &[f64], draw: f64) -> Signal {
        match self.strategy {
            Strategy::Momentum => {
                momentum::evaluate(&self.params.momentum, current_price, history, draw)
            }
            Strategy::Breakout => {
                breakout::evaluate(&self.params.breakout, current_price, history, draw)
            }
            Strategy::MeanReversion => {
                mean_reversion::evaluate(&self.params.mean_reversion, current_price, history, draw)
            }
        }
    }
}

/// The most recent `n` values of `history`, or `None` if it is shorter.
pub(crate) fn tail(history: &[f64], n: usize) -> Option<&[f64]> {
    if n == 0 || history.len() < n {
        return None;
    }
    Some(&history[history.len() - n..])
}
