//! Domain types for the trading bot.

pub mod instrument;
pub mod position;
pub mod price;
pub mod trade;

pub use instrument::{AssetClass, Universe};
pub use position::{Position, PositionSide};
pub use price::{HistoryError, PriceHistory, PricePoint};
pub use trade::{CloseReason, TradeLog, TradeRecord};
