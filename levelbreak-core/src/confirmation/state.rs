use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Bar, Side};
use crate::levels::KeyLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakoutType {
    Bullish,
    Bearish,
}

impl BreakoutType {
    /// Side of the position a confirmed breakout opens.
    pub fn side(self) -> Side {
        match self {
            BreakoutType::Bullish => Side::Long,
            BreakoutType::Bearish => Side::Short,
        }
    }

    /// Whether `close` lies beyond `level` in the breakout direction.
    pub fn is_beyond(self, close: f64, level: f64) -> bool {
        match self {
            BreakoutType::Bullish => close > level,
            BreakoutType::Bearish => close < level,
        }
    }
}

impl fmt::Display for BreakoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakoutType::Bullish => f.write_str("bullish"),
            BreakoutType::Bearish => f.write_str("bearish"),
        }
    }
}

/// `prev.close <= level < bar.close` is bullish, the mirror bearish.
pub fn detect_crossing(prev: &Bar, bar: &Bar, level: f64) -> Option<BreakoutType> {
    if prev.close <= level && level < bar.close {
        Some(BreakoutType::Bullish)
    } else if prev.close >= level && level > bar.close {
        Some(BreakoutType::Bearish)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationOutcome {
    Pending,
    Confirmed,
    /// Price closed back through the level: a false breakout.
    Invalidated,
    TimedOut,
}

impl ConfirmationOutcome {
    pub fn is_resolved(self) -> bool {
        self != ConfirmationOutcome::Pending
    }
}

/// One breakout awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationState {
    pub level: KeyLevel,
    pub breakout_type: BreakoutType,
    pub start_time: DateTime<Utc>,
    /// Close of the breakout bar.
    pub breakout_price: f64,
    pub confirmed_candles: usize,
    pub bars_elapsed: usize,
    pub volume_ratio: f64,
    /// Mean volume before the breakout; `None` without earlier bars.
    pub volume_baseline: Option<f64>,
    pub momentum_value: f64,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bar;

    #[test]
    fn crossing_direction() {
        let below = bar(0, 1.1845, 1.1848, 1.1840, 1.1845, 1000);
        let above = bar(1, 1.1845, 1.1862, 1.1844, 1.1860, 1000);
        assert_eq!(detect_crossing(&below, &above, 1.1850), Some(BreakoutType::Bullish));
        assert_eq!(detect_crossing(&above, &below, 1.1850), Some(BreakoutType::Bearish));
        assert_eq!(detect_crossing(&above, &above, 1.1850), None);
    }

    #[test]
    fn close_on_the_level_is_not_a_bullish_crossing() {
        let below = bar(0, 1.0, 1.0, 1.0, 0.99, 1000);
        let on = bar(1, 1.0, 1.0, 1.0, 1.0, 1000);
        assert_eq!(detect_crossing(&below, &on, 1.0), None);
        // ...but leaving it downward is bearish
        assert_eq!(detect_crossing(&on, &below, 1.0), Some(BreakoutType::Bearish));
    }
}
