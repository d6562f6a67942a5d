//! Average True Range, Wilder smoothed. Lookback: period.

use super::{wilder_smooth, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    /// A zero period is clamped to 1.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// TR[t] = max(high-low, |high-prev_close|, |low-prev_close|); TR[0] = high-low.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
                None => range,
            }
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        // TR[0] has no previous close, so the seed starts at TR[1].
        wilder_smooth(&true_range(bars), self.period, 1)
    }
}
