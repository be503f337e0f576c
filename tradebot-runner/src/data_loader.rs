//! Price series loading for the runner.
//!
//! Two sources:
//! 1. Synthetic: per-symbol cumulative sum of normal increments on a
//!    business-day calendar, seeded so the same seed gives the same series.
//! 2. CSV: `timestamp,symbol,price` rows, grouped per symbol.
//!
//! Every loaded series is validated through [`PriceHistory`], so an
//! out-of-order or non-positive row fails the load.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use tradebot_core::domain::{HistoryError, PriceHistory, PricePoint};
use tradebot_core::rng::RngHierarchy;

use crate::config::SymbolConfig;

/// Per-symbol price series, keyed and iterated in symbol order.
pub type SeriesMap = BTreeMap<String, Vec<PricePoint>>;

/// Stream index reserved for synthetic series in the seed hierarchy.
pub const SERIES_STREAM: u64 = 0;

/// Floor applied to synthetic prices so a series never leaves the valid domain.
const MIN_SYNTHETIC_PRICE: f64 = 0.01;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid series for '{symbol}': {source}")]
    History {
        symbol: String,
        #[source]
        source: HistoryError,
    },
    #[error("invalid distribution for '{symbol}': mean {mean}, std {std}")]
    Distribution { symbol: String, mean: f64, std: f64 },
    #[error("no price rows in {0}")]
    Empty(String),
}

/// Generate one synthetic series per configured symbol.
pub fn synthetic_series(
    symbols: &[SymbolConfig],
    periods: usize,
    start: NaiveDate,
    master_seed: u64,
) -> Result<SeriesMap, LoadError> {
    let seeds = RngHierarchy::new(master_seed);
    let dates = business_days(start, periods);
    let mut out = SeriesMap::new();

    for cfg in symbols {
        let normal =
            Normal::new(cfg.step_mean, cfg.step_std).map_err(|_| LoadError::Distribution {
                symbol: cfg.symbol.clone(),
                mean: cfg.step_mean,
                std: cfg.step_std,
            })?;
        let mut rng = StdRng::seed_from_u64(seeds.sub_seed(&cfg.symbol, SERIES_STREAM));

        let mut level = cfg.start_price;
        let points: Vec<PricePoint> = dates
            .iter()
            .map(|&date| {
                level += normal.sample(&mut rng);
                PricePoint::new(
                    at_midnight(date),
                    cfg.symbol.as_str(),
                    level.max(MIN_SYNTHETIC_PRICE),
                )
            })
            .collect();
        debug!(symbol = %cfg.symbol, bars = points.len(), "generated synthetic series");
        out.insert(cfg.symbol.clone(), points);
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    timestamp: DateTime<Utc>,
    symbol: String,
    price: f64,
}

/// Load a `timestamp,symbol,price` CSV file.
pub fn load_csv(path: &Path) -> Result<SeriesMap, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let series = read_csv(file)?;
    if series.is_empty() {
        return Err(LoadError::Empty(path.display().to_string()));
    }
    info!(
        path = %path.display(),
        symbols = series.len(),
        "loaded price csv"
    );
    Ok(series)
}

/// Parse CSV rows from any reader, validating each symbol's ordering.
pub fn read_csv<R: std::io::Read>(reader: R) -> Result<SeriesMap, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut histories: BTreeMap<String, PriceHistory> = BTreeMap::new();

    for row in rdr.deserialize::<PriceRow>() {
        let row = row?;
        let history = histories
            .entry(row.symbol.clone())
            .or_insert_with(|| PriceHistory::new(row.symbol.as_str()));
        history
            .push(PricePoint::new(row.timestamp, row.symbol.as_str(), row.price))
            .map_err(|source| LoadError::History {
                symbol: row.symbol.clone(),
                source,
            })?;
    }

    Ok(histories
        .into_iter()
        .map(|(symbol, h)| (symbol, h.points().to_vec()))
        .collect())
}

/// `n` consecutive weekdays starting at `start` (skipped forward if it is a
/// weekend).
fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut current = start;
    while days.len() < n {
        let weekday = current.weekday();
        if weekday != chrono::Weekday::Sat && weekday != chrono::Weekday::Sun {
            days.push(current);
        }
        current += chrono::Duration::days(1);
    }
    days
}

fn at_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradebot_core::domain::AssetClass;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap() // a Friday
    }

    fn cfg(symbol: &str) -> SymbolConfig {
        SymbolConfig::new(symbol, AssetClass::Equity, 1_000.0, 200.0, 5.0)
    }

    #[test]
    fn business_days_skip_weekends() {
        let days = business_days(start(), 3);
        assert_eq!(days[0], start());
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert_eq!(days[2], NaiveDate::from_ymd_opt(2024, 1, 9).unwrap());
    }

    #[test]
    fn synthetic_is_deterministic() {
        let a = synthetic_series(&[cfg("GOOGL")], 50, start(), 7).unwrap();
        let b = synthetic_series(&[cfg("GOOGL")], 50, start(), 7).unwrap();
        assert_eq!(a, b);
        let c = synthetic_series(&[cfg("GOOGL")], 50, start(), 8).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn synthetic_symbols_differ() {
        let s = synthetic_series(&[cfg("AAA"), cfg("BBB")], 20, start(), 1).unwrap();
        assert_eq!(s.len(), 2);
        assert_ne!(s["AAA"][0].price, s["BBB"][0].price);
    }

    #[test]
    fn synthetic_drift_accumulates() {
        let s = synthetic_series(&[cfg("GOOGL")], 100, start(), 3).unwrap();
        let prices: Vec<f64> = s["GOOGL"].iter().map(|p| p.price).collect();
        assert_eq!(prices.len(), 100);
        // 100 steps of mean 200: roughly 1000 + 20_000.
        let last = prices[99];
        assert!(last > 19_000.0 && last < 23_000.0, "last = {last}");
        // Valid history: ordered and positive.
        PriceHistory::from_points("GOOGL", s["GOOGL"].clone()).unwrap();
    }

    #[test]
    fn synthetic_prices_stay_positive() {
        let falling = SymbolConfig::new("DOWN", AssetClass::Crypto, 1.0, -5.0, 0.1);
        let s = synthetic_series(&[falling], 30, start(), 9).unwrap();
        assert!(s["DOWN"].iter().all(|p| p.price >= MIN_SYNTHETIC_PRICE));
    }

    #[test]
    fn negative_std_rejected() {
        let bad = SymbolConfig::new("BAD", AssetClass::Crypto, 1.0, 0.0, -1.0);
        assert!(matches!(
            synthetic_series(&[bad], 5, start(), 1),
            Err(LoadError::Distribution { .. })
        ));
    }

    #[test]
    fn csv_groups_by_symbol() {
        let data = "timestamp,symbol,price\n\
                    2024-01-02T00:00:00Z,BTC,42000.5\n\
                    2024-01-02T00:00:00Z,ETH,2200\n\
                    2024-01-03T00:00:00Z,BTC,42500\n";
        let s = read_csv(data.as_bytes()).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s["BTC"].len(), 2);
        assert_eq!(s["ETH"][0].price, 2200.0);
    }

    #[test]
    fn csv_out_of_order_rejected() {
        let data = "timestamp,symbol,price\n\
                    2024-01-03T00:00:00Z,BTC,1\n\
                    2024-01-02T00:00:00Z,BTC,2\n";
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(LoadError::History {
                source: HistoryError::OutOfOrder { .. },
                ..
            })
        ));
    }

    #[test]
    fn csv_non_positive_rejected() {
        let data = "timestamp,symbol,price\n2024-01-02T00:00:00Z,BTC,0\n";
        assert!(matches!(
            read_csv(data.as_bytes()),
            Err(LoadError::History { .. })
        ));
    }

    #[test]
    fn load_csv_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(&path, "timestamp,symbol,price\n2024-01-02T00:00:00Z,SOL,101\n").unwrap();
        let s = load_csv(&path).unwrap();
        assert_eq!(s["SOL"][0].price, 101.0);

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "timestamp,symbol,price\n").unwrap();
        assert!(matches!(load_csv(&empty), Err(LoadError::Empty(_))));

        assert!(matches!(
            load_csv(&dir.path().join("missing.csv")),
            Err(LoadError::Io { .. })
        ));
    }

    proptest::proptest! {
        #[test]
        fn synthetic_series_always_valid(
            seed in proptest::prelude::any::<u64>(),
            mean in -50.0f64..50.0,
            std in 0.0f64..100.0,
            periods in 1usize..60,
        ) {
            let cfg = SymbolConfig::new("PROP", AssetClass::Crypto, 100.0, mean, std);
            let s = synthetic_series(&[cfg], periods, start(), seed).unwrap();
            proptest::prop_assert_eq!(s["PROP"].len(), periods);
            proptest::prop_assert!(PriceHistory::from_points("PROP", s["PROP"].clone()).is_ok());
        }
    }
}
