//! Artifact export: JSON summary and CSV trade tape.
//!
//! `summary.json` holds the full [`BacktestResult`] with its `schema_version`;
//! unknown (newer) versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tradebot_core::domain::TradeRecord;

use crate::backtest::{BacktestResult, SCHEMA_VERSION};

pub const SUMMARY_FILE: &str = "summary.json";
pub const TRADES_FILE: &str = "trades.csv";

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

/// Trade log as CSV, one row per closed trade in log order.
///
/// Columns: closed_at, symbol, side, quantity, entry_time, entry_price,
/// exit_price, fee, pnl, cumulative_pnl, reason
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "closed_at",
        "symbol",
        "side",
        "quantity",
        "entry_time",
        "entry_price",
        "exit_price",
        "fee",
        "pnl",
        "cumulative_pnl",
        "reason",
    ])?;

    for t in trades {
        wtr.write_record([
            &t.closed_at.to_rfc3339(),
            &t.symbol,
            &t.side.to_string(),
            &format!("{:.6}", t.quantity),
            &t.entry_time.to_rfc3339(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.exit_price),
            &format!("{:.4}", t.fee),
            &format!("{:.4}", t.pnl),
            &format!("{:.4}", t.cumulative_pnl),
            &t.reason.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write `summary.json` and `trades.csv` into `{strategy}_{timestamp}/` under
/// `output_dir`. Returns the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        result.strategy,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join(SUMMARY_FILE), export_json(result)?)?;
    std::fs::write(run_dir.join(TRADES_FILE), export_trades_csv(&result.trades)?)?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join(SUMMARY_FILE);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
