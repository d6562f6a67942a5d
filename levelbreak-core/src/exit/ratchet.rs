//! Stop ratchet: stops may tighten, never loosen.
//!
//! Long stops only rise and short stops only fall. A tightening smaller than
//! the minimum improvement is skipped so the stop does not thrash.

use serde::{Deserialize, Serialize};

use crate::domain::Side;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopUpdate {
    Tightened { from: f64, to: f64 },
    /// The proposal would widen risk; rejected.
    Widening { current: f64, proposed: f64 },
    /// Tightens, but by less than the minimum improvement.
    BelowMinimum { current: f64, proposed: f64 },
}

impl StopUpdate {
    pub fn is_tightened(&self) -> bool {
        matches!(self, StopUpdate::Tightened { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopRatchet {
    side: Side,
    /// Smallest accepted improvement, price units.
    min_improvement: f64,
}

impl StopRatchet {
    pub fn new(side: Side, min_improvement: f64) -> Self {
        Self {
            side,
            min_improvement,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Judge `proposed` against `current` and write it when it tightens enough.
    pub fn apply(&self, current: &mut f64, proposed: f64) -> StopUpdate {
        let improvement = self.side.profit(*current, proposed);
        if improvement < 0.0 {
            StopUpdate::Widening {
                current: *current,
                proposed,
            }
        } else if improvement < self.min_improvement {
            StopUpdate::BelowMinimum {
                current: *current,
                proposed,
            }
        } else {
            let from = *current;
            *current = proposed;
            StopUpdate::Tightened { from, to: proposed }
        }
    }
}
