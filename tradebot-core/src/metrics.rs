//! Performance metrics: pure functions over the closed-trade log.
//!
//! Every metric is computed from the per-trade P/L sequence and its running
//! cumulative sum. Degenerate inputs yield neutral values; no metric is ever
//! NaN or infinite.

use serde::{Deserialize, Serialize};

use crate::domain::TradeRecord;

/// Periods per year used to annualize the Sharpe ratio.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Annualization {
    /// 252 trading days (equities).
    #[default]
    TradingDays,
    /// 365 days (crypto, round-the-clock markets).
    Continuous,
    Custom(f64),
}

impl Annualization {
    pub fn periods(self) -> f64 {
        match self {
            Annualization::TradingDays => 252.0,
            Annualization::Continuous => 365.0,
            Annualization::Custom(n) => n,
        }
    }
}

/// Aggregate performance metrics for a trade log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_pnl: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_ratio: f64,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub trade_count: usize,
    pub profit_factor: f64,
    pub max_consecutive_losses: usize,
}

impl Metrics {
    pub fn compute(trades: &[TradeRecord], annualization: Annualization) -> Self {
        if trades.is_empty() {
            return Self::default();
        }
        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
        let cumulative: Vec<f64> = trades.iter().map(|t| t.cumulative_pnl).collect();
        Self {
            total_pnl: finite_or_zero(cumulative.last().copied().unwrap_or(0.0)),
            sharpe_ratio: sharpe_ratio(&pnls, annualization),
            max_drawdown: max_drawdown(&cumulative),
            win_ratio: win_ratio(&pnls),
            winning_trades: pnls.iter().filter(|p| **p > 0.0).count(),
            losing_trades: pnls.iter().filter(|p| **p < 0.0).count(),
            trade_count: trades.len(),
            profit_factor: profit_factor(&pnls),
            max_consecutive_losses: max_consecutive_losses(&pnls),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Annualized Sharpe ratio over per-trade P/L.
///
/// mean / sample std * sqrt(periods). Returns 0.0 for fewer than 2 trades or
/// zero variance.
pub fn sharpe_ratio(pnls: &[f64], annualization: Annualization) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let std = std_dev(pnls);
    if std < 1e-15 {
        return 0.0;
    }
    finite_or_zero(mean_f64(pnls) / std * annualization.periods().max(0.0).sqrt())
}

/// Maximum drawdown of the cumulative P/L curve as a non-positive fraction.
///
/// Steps whose running peak is not positive contribute 0.
pub fn max_drawdown(cumulative: &[f64]) -> f64 {
    let Some(&first) = cumulative.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &cum in cumulative {
        if cum > peak {
            peak = cum;
        }
        if peak > 0.0 {
            let dd = (cum - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    finite_or_zero(max_dd)
}

/// Fraction of trades with positive P/L.
pub fn win_ratio(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let winners = pnls.iter().filter(|p| **p > 0.0).count();
    winners as f64 / pnls.len() as f64
}

/// Gross profits / gross losses, capped at 100.0.
pub fn profit_factor(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    finite_or_zero((gross_profit / gross_loss).min(100.0))
}

/// Longest run of consecutive losing trades.
pub fn max_consecutive_losses(pnls: &[f64]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for &p in pnls {
        if p < 0.0 {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}
