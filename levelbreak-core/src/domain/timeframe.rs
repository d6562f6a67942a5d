//! Bar granularity and the per-timeframe detection defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chart timeframe of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

/// Detection defaults derived from timeframe granularity.
///
/// Coarser timeframes scan fewer bars with a wider tolerance and require a
/// larger excursion between touches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeDefaults {
    pub lookback: usize,
    pub touch_zone_pips: f64,
    pub movement_multiplier: f64,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Bar duration in minutes.
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1_440,
            Timeframe::W1 => 10_080,
        }
    }

    pub fn defaults(self) -> TimeframeDefaults {
        let (lookback, touch_zone_pips, movement_multiplier) = match self {
            Timeframe::M1 => (500, 3.0, 1.0),
            Timeframe::M5 => (400, 5.0, 1.2),
            Timeframe::M15 => (300, 8.0, 1.5),
            Timeframe::M30 => (250, 10.0, 1.8),
            Timeframe::H1 => (200, 15.0, 2.0),
            Timeframe::H4 => (150, 25.0, 2.5),
            Timeframe::D1 => (100, 50.0, 3.0),
            Timeframe::W1 => (52, 100.0, 3.5),
        };
        TimeframeDefaults {
            lookback,
            touch_zone_pips,
            movement_multiplier,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
            Timeframe::W1 => "W1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown timeframe '{s}' (expected one of M1..W1)"))
    }
}
