//! Breakout confirmation: a multi-bar, multi-factor gate between a level
//! crossing and a tradable signal.
//!
//! Per level: `Idle → AwaitingConfirmation → {Confirmed | Invalidated | TimedOut} → Idle`.
//! Resolved states leave the engine; at most one state per level awaits.

pub mod engine;
pub mod state;

pub use engine::{BeginOutcome, BreakoutConfirmationEngine, ConfirmationParams, Resolution};
pub use state::{detect_crossing, BreakoutType, ConfirmationOutcome, ConfirmationState};
