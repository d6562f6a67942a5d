//! Bar input: CSV files and seeded synthetic series.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use levelbreak_core::domain::{Bar, Timeframe};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CsvBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: u64,
}

/// RFC 3339, or naive UTC as `YYYY-MM-DD HH:MM[:SS]` / `YYYY.MM.DD HH:MM`.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y.%m.%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    bail!("unrecognised timestamp '{s}'")
}

/// Load `timestamp,open,high,low,close,volume` rows, sorted chronologically.
///
/// Malformed prices are an error; duplicate timestamps keep the last row.
pub fn load_csv(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<CsvBar>().enumerate() {
        let line = row + 2;
        let record = record.with_context(|| format!("{}:{line}", path.display()))?;
        let bar = Bar {
            timestamp: parse_timestamp(&record.timestamp)
                .with_context(|| format!("{}:{line}", path.display()))?,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        };
        if !bar.is_sane() {
            bail!("{}:{line}: inconsistent prices {bar:?}", path.display());
        }
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    // dedup_by keeps the first of a run; reverse so the last row wins
    bars.reverse();
    bars.dedup_by_key(|b| b.timestamp);
    bars.reverse();
    if bars.len() < before {
        warn!(dropped = before - bars.len(), "duplicate timestamps dropped");
    }

    info!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

/// Deterministic random walk around `start_price`, one bar per `timeframe`.
///
/// Without an explicit seed the series is seeded from the symbol, so the same
/// symbol always replays the same bars.
pub fn synthetic_bars(
    symbol: &str,
    timeframe: Timeframe,
    count: usize,
    start_price: f64,
    seed: Option<u64>,
) -> Vec<Bar> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_seed(*blake3::hash(symbol.as_bytes()).as_bytes()),
    };

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    let step = Duration::minutes(timeframe.minutes());
    // Per-bar volatility grows with the square root of the bar length.
    let sigma = 0.0004 * (timeframe.minutes() as f64 / 60.0).sqrt();

    let mut bars = Vec::with_capacity(count);
    let mut price = start_price;
    for i in 0..count {
        let ret: f64 = rng.gen_range(-sigma..sigma);
        let open = price;
        let close = price * (1.0 + ret);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..sigma / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..sigma / 2.0));
        let volume = rng.gen_range(500..5_000u64);
        bars.push(Bar {
            timestamp: start + step * i as i32,
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }
    bars
}
