//! Trade intents emitted by the core.
//!
//! The engines emit *intents*, never direct fills. The order gateway decides
//! how (and whether) they reach a broker.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Side;

/// Broker-agnostic order request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeIntent {
    /// Open a new position with protective stop and target.
    OpenPosition {
        side: Side,
        size: f64,
        stop: f64,
        target: f64,
    },

    /// Move the stop of an open position.
    ModifyStop { ticket: u64, new_stop: f64 },

    /// Close `volume_fraction` (0, 1] of the position's current volume.
    ClosePosition { ticket: u64, volume_fraction: f64 },
}

impl TradeIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            TradeIntent::OpenPosition { .. } => "open_position",
            TradeIntent::ModifyStop { .. } => "modify_stop",
            TradeIntent::ClosePosition { .. } => "close_position",
        }
    }

    /// Ticket targeted by this intent, if it refers to an existing position.
    pub fn ticket(&self) -> Option<u64> {
        match self {
            TradeIntent::OpenPosition { .. } => None,
            TradeIntent::ModifyStop { ticket, .. } | TradeIntent::ClosePosition { ticket, .. } => {
                Some(*ticket)
            }
        }
    }
}

impl fmt::Display for TradeIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeIntent::OpenPosition {
                side,
                size,
                stop,
                target,
            } => write!(f, "open {side} {size} lots stop={stop:.5} target={target:.5}"),
            TradeIntent::ModifyStop { ticket, new_stop } => {
                write!(f, "modify #{ticket} stop={new_stop:.5}")
            }
            TradeIntent::ClosePosition {
                ticket,
                volume_fraction,
            } => write!(f, "close #{ticket} fraction={volume_fraction:.2}"),
        }
    }
}

/// Gateway acknowledgement of an accepted intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub ticket: u64,
    /// Fill price for opens and closes; the new stop for stop modifications.
    pub price: f64,
    /// Volume remaining open after the intent was applied.
    pub remaining_volume: f64,
}

/// Broker-side view of an open position, the authoritative state the exit
/// manager reconciles against each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub ticket: u64,
    pub side: Side,
    pub volume: f64,
    pub entry_price: f64,
    pub stop: f64,
    pub target: f64,
}
