//! Indicators consumed by the confirmation and exit engines.
//!
//! Indicators are pure functions: bar history in, numeric series out. The
//! first `lookback()` values are `f64::NAN` (warmup). No value at bar t may
//! depend on bars after t.

pub mod atr;
pub mod rsi;
pub mod volume;

pub use atr::Atr;
pub use rsi::Rsi;
pub use volume::volume_baseline;

use crate::domain::Bar;

pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g. "rsi_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series; same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;

    /// Value at the last bar, `None` while warming up.
    fn latest(&self, bars: &[Bar]) -> Option<f64> {
        self.compute(bars).last().copied().filter(|v| v.is_finite())
    }
}

/// Wilder smoothing (alpha = 1/period), seeded with the mean of the first
/// `period` values starting at `seed_start`. Earlier slots stay NaN; a NaN
/// input truncates the rest of the output.
pub(crate) fn wilder_smooth(values: &[f64], period: usize, seed_start: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    let seed_end = seed_start + period;
    if period == 0 || seed_end > n {
        return result;
    }

    let seed = &values[seed_start..seed_end];
    if seed.iter().any(|v| v.is_nan()) {
        return result;
    }
    let mut prev = seed.iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}
