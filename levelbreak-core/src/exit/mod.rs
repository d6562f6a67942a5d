//! Exit management for one open position.
//!
//! Two overlapping tracks: lifecycle `Active → PartiallyClosed → Closed`,
//! and the stop sub-states (breakeven set, trailing active). The sub-state
//! flags are re-derived from the observed broker stop every cycle.

pub mod manager;
pub mod ratchet;
pub mod state;

pub use manager::{ExitManager, ExitObservation, ExitParams};
pub use ratchet::{StopRatchet, StopUpdate};
pub use state::{ExitState, ExitType, Lifecycle, StopSource};
