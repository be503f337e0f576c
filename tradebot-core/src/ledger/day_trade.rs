//! Pattern-day-trade guard: caps new entries per calendar day for restricted
//! asset classes.
//!
//! The counter resets exactly once, on the first observation of a later date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::AssetClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayTradeGuard {
    max_entries_per_day: u32,
    entries_today: u32,
    current_day: Option<NaiveDate>,
}

impl DayTradeGuard {
    pub fn new(max_entries_per_day: u32) -> Self {
        Self {
            max_entries_per_day,
            entries_today: 0,
            current_day: None,
        }
    }

    pub fn max_entries_per_day(&self) -> u32 {
        self.max_entries_per_day
    }

    pub fn entries_today(&self) -> u32 {
        self.entries_today
    }

    /// Advance the guard's clock. Returns `true` if the counter was reset.
    pub fn observe(&mut self, day: NaiveDate) -> bool {
        match self.current_day {
            None => {
                self.current_day = Some(day);
                false
            }
            Some(current) if day > current => {
                self.current_day = Some(day);
                self.entries_today = 0;
                true
            }
            Some(_) => false,
        }
    }

    /// Whether a new entry in `class` is allowed right now.
    pub fn permits(&self, class: AssetClass) -> bool {
        !class.is_day_trade_restricted() || self.entries_today < self.max_entries_per_day
    }

    pub fn record_entry(&mut self, class: AssetClass) {
        if class.is_day_trade_restricted() {
            self.entries_today += 1;
        }
    }
}
