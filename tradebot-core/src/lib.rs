//! Tradebot Core: price history, signals, position ledger, metrics, bot state.
//!
//! This crate contains the trading engine shared by the backtest runner and
//! the live loop:
//! - Domain types (price points, positions, trade records, instruments)
//! - Strategy signals gated by an injected random source
//! - Position ledger with stop-loss / take-profit and pluggable sizing
//! - Metrics computed from the closed-trade log
//! - `BotState`, the per-instance pipeline both drivers step through

pub mod bot;
pub mod domain;
pub mod feed;
pub mod ledger;
pub mod metrics;
pub mod rng;
pub mod signals;
