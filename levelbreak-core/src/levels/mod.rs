//! Key level detection: swing extrema clustered into priced levels, scored by
//! touch count, recency and span.

pub mod cluster;
pub mod detector;
pub mod strength;
pub mod swing;
pub mod touch;

pub use detector::{
    detect_levels, scan, DetectorParams, Detection, KeyLevelDetector, RejectReason, Rejection,
};
pub use strength::{score_strength, StrengthInputs};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLevel {
    pub price: f64,
    /// Above the reference price at the last reclassification.
    pub is_resistance: bool,
    pub touch_count: usize,
    pub first_touch: DateTime<Utc>,
    pub last_touch: DateTime<Utc>,
    pub strength: f64,
}

impl KeyLevel {
    pub fn reclassify(&mut self, reference_price: f64) {
        self.is_resistance = self.price > reference_price;
    }

    /// Whether `price` lies within `touch_zone` of this level.
    pub fn is_near(&self, price: f64, touch_zone: f64) -> bool {
        (self.price - price).abs() <= touch_zone
    }

    pub fn role(&self) -> &'static str {
        if self.is_resistance {
            "resistance"
        } else {
            "support"
        }
    }
}
