//! Position sizing policies: determine entry quantity.
//!
//! Sizers are balance-aware but signal-agnostic. A return value of 0.0 means
//! "do not open".

use crate::rng::RandomSource;

/// Position sizing logic.
pub trait SizingPolicy: Send + Sync {
    /// Quantity to open at `price` given the currently available balance.
    fn quantity(&self, price: f64, available_balance: f64, rng: &mut dyn RandomSource) -> f64;

    /// Sizer name for logging.
    fn name(&self) -> &str;
}

/// Uniform random whole-share count in `[min, max]`.
#[derive(Debug, Clone)]
pub struct RandomShares {
    pub min: u32,
    pub max: u32,
}

impl RandomShares {
    pub fn new(min: u32, max: u32) -> Self {
        assert!(min >= 1, "min shares must be >= 1");
        assert!(max >= min, "max shares must be >= min");
        Self { min, max }
    }
}

impl Default for RandomShares {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

impl SizingPolicy for RandomShares {
    fn quantity(&self, _price: f64, _available_balance: f64, rng: &mut dyn RandomSource) -> f64 {
        rng.next_int(self.min, self.max) as f64
    }

    fn name(&self) -> &str {
        "random_shares"
    }
}

/// Commit a fixed fraction of the available balance.
#[derive(Debug, Clone)]
pub struct BalanceFraction {
    pub fraction: f64,
    /// Round down to whole units (equities); otherwise fractional (crypto).
    pub whole_units: bool,
}

impl BalanceFraction {
    pub fn new(fraction: f64, whole_units: bool) -> Self {
        assert!(
            fraction > 0.0 && fraction <= 1.0,
            "fraction must be in (0, 1]"
        );
        Self {
            fraction,
            whole_units,
        }
    }
}

impl SizingPolicy for BalanceFraction {
    fn quantity(&self, price: f64, available_balance: f64, _rng: &mut dyn RandomSource) -> f64 {
        if price <= 0.0 || available_balance <= 0.0 {
            return 0.0;
        }
        let qty = available_balance * self.fraction / price;
        if self.whole_units {
            qty.floor()
        } else {
            qty
        }
    }

    fn name(&self) -> &str {
        "balance_fraction"
    }
}

/// Always the same quantity.
#[derive(Debug, Clone)]
pub struct FixedQuantity {
    pub quantity: f64,
}

impl FixedQuantity {
    pub fn new(quantity: f64) -> Self {
        assert!(quantity > 0.0, "quantity must be > 0");
        Self { quantity }
    }
}

impl SizingPolicy for FixedQuantity {
    fn quantity(&self, _price: f64, _available_balance: f64, _rng: &mut dyn RandomSource) -> f64 {
        self.quantity
    }

    fn name(&self) -> &str {
        "fixed_quantity"
    }
}
