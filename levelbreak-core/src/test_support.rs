//! Bar builders shared by unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::domain::Bar;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

/// Hourly bar `i` after the start time.
pub fn bar(i: i64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Bar {
    Bar {
        timestamp: start_time() + Duration::hours(i),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// One hourly bar per close, range `close ± half_range`, volume 1000.
pub fn bars_from_closes(closes: &[f64], half_range: f64) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(i as i64, c, c + half_range, c - half_range, c, 1000))
        .collect()
}

pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}
