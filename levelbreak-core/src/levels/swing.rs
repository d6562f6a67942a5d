//! Swing extrema: bars whose high (low) strictly exceeds (undercuts) every
//! neighbor inside a symmetric window.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    /// Index into the scanned bar slice.
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

/// Find swing highs and lows, in chronological order.
///
/// Bars closer than `window` to either end of the slice cannot be confirmed
/// and are skipped. Equal neighbors disqualify a candidate.
pub fn find_swings(bars: &[Bar], high_window: usize, low_window: usize) -> Vec<SwingPoint> {
    let mut swings = Vec::new();
    let n = bars.len();

    for i in 0..n {
        if is_swing(bars, i, high_window, |b| b.high, |c, o| c > o) {
            swings.push(SwingPoint {
                index: i,
                price: bars[i].high,
                kind: SwingKind::High,
            });
        }
        if is_swing(bars, i, low_window, |b| b.low, |c, o| c < o) {
            swings.push(SwingPoint {
                index: i,
                price: bars[i].low,
                kind: SwingKind::Low,
            });
        }
    }

    swings
}

fn is_swing(
    bars: &[Bar],
    i: usize,
    window: usize,
    value: impl Fn(&Bar) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> bool {
    if window == 0 || i < window || i + window >= bars.len() {
        return false;
    }
    let candidate = value(&bars[i]);
    if candidate.is_nan() {
        return false;
    }
    (i - window..=i + window)
        .filter(|&j| j != i)
        .all(|j| beats(candidate, value(&bars[j])))
}
