//! Bar and quote: the market data units consumed by every engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol on a single timeframe.
///
/// Inside the core, bar slices are always chronological (oldest first).
/// Providers hand them out newest-first; the context reverses them once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// A bar with any NaN price. Feeds emit these for closed sessions.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// No NaN prices, a positive close, and a high/low range containing open and close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }

    /// True when `price` lies inside the bar range widened by `tolerance` on both sides.
    pub fn touches(&self, price: f64, tolerance: f64) -> bool {
        self.low - tolerance <= price && price <= self.high + tolerance
    }

    /// Largest distance between the bar's range and `price`.
    pub fn excursion_from(&self, price: f64) -> f64 {
        (self.high - price).abs().max((price - self.low).abs())
    }

    /// Position of the close inside the bar range: 0.0 at the low, 1.0 at the high.
    pub fn close_location(&self) -> f64 {
        let range = self.high - self.low;
        if range <= 0.0 {
            return 0.5;
        }
        ((self.close - self.low) / range).clamp(0.0, 1.0)
    }
}

/// Live quote snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub volume: u64,
}

impl Quote {
    /// Mid price, the reference used for support/resistance classification.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// A quote synthesised from a bar close (zero spread).
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            bid: bar.close,
            ask: bar.close,
            volume: bar.volume,
        }
    }
}
