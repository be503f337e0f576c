use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instrument class. Equities are subject to the day-trade guard; crypto is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Crypto,
}

impl AssetClass {
    pub fn is_day_trade_restricted(self) -> bool {
        matches!(self, AssetClass::Equity)
    }
}

/// The set of tradable symbols and their asset classes.
///
/// Iteration order is sorted by symbol so that every consumer walks the
/// universe deterministically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Universe {
    symbols: BTreeMap<String, AssetClass>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: impl Into<String>, class: AssetClass) -> Self {
        self.insert(symbol, class);
        self
    }

    pub fn insert(&mut self, symbol: impl Into<String>, class: AssetClass) {
        self.symbols.insert(symbol.into(), class);
    }

    /// Asset class for `symbol`. Unknown symbols are treated as unrestricted.
    pub fn class_of(&self, symbol: &str) -> AssetClass {
        self.symbols
            .get(symbol)
            .copied()
            .unwrap_or(AssetClass::Crypto)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
