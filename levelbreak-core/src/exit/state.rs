use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ExitMode;
use crate::domain::Side;

/// Why a position was fully closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    StopLoss,
    TakeProfit,
    TrailingStop,
    Breakeven,
    TimeStop,
    Manual,
}

impl fmt::Display for ExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitType::StopLoss => "stop_loss",
            ExitType::TakeProfit => "take_profit",
            ExitType::TrailingStop => "trailing_stop",
            ExitType::Breakeven => "breakeven",
            ExitType::TimeStop => "time_stop",
            ExitType::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Active,
    PartiallyClosed,
    Closed,
}

/// What last placed the stop, which decides the exit type when it is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopSource {
    Initial,
    Breakeven,
    Trailing,
    /// Adopted from the broker after an outside edit.
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitState {
    pub ticket: u64,
    pub side: Side,
    pub entry_price: f64,
    pub initial_stop: f64,
    /// Only the ratchet writes this, except when adopting the broker's stop.
    pub current_stop: f64,
    pub stop_source: StopSource,
    pub take_profit: f64,
    pub breakeven_level: f64,
    pub trailing_stop: Option<f64>,
    /// Best favorable excursion, price units.
    pub max_floating_profit: f64,
    /// Worst adverse excursion as a positive distance.
    pub max_floating_loss: f64,
    pub exit_mode: ExitMode,
    pub total_lots: f64,
    pub remaining_lots: f64,
    pub lifecycle: Lifecycle,
    pub breakeven_set: bool,
    pub trailing_active: bool,
    pub partials_taken: u32,
    /// Lots of a partial close submitted but not yet filled.
    #[serde(default)]
    pub pending_partial: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub bars_held: usize,
    pub time_stop_armed: bool,
    pub manual_exit_requested: bool,
}

impl ExitState {
    pub fn floating_profit(&self, price: f64) -> f64 {
        self.side.profit(self.entry_price, price)
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle != Lifecycle::Closed
    }

    pub fn minutes_held(&self, now: DateTime<Utc>) -> f64 {
        (now - self.opened_at).num_seconds().max(0) as f64 / 60.0
    }

    /// Exit type reported when the current stop is hit.
    pub fn stop_exit_type(&self) -> ExitType {
        match self.stop_source {
            StopSource::Initial => ExitType::StopLoss,
            StopSource::Breakeven => ExitType::Breakeven,
            StopSource::Trailing => ExitType::TrailingStop,
            StopSource::External if self.side.profit(self.entry_price, self.current_stop) >= 0.0 => {
                ExitType::Breakeven
            }
            StopSource::External => ExitType::StopLoss,
        }
    }
}
