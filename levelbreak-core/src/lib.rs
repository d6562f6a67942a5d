//! LevelBreak Core: key-level detection, breakout confirmation, exit
//! management, and the per-`(symbol, timeframe)` orchestration around them.
//!
//! - Domain types (bars, quotes, timeframes, instruments)
//! - Key level detector: swings → clusters → touches → strength
//! - Breakout confirmation state machine with candle/volume/momentum gates
//! - Exit manager with breakeven, trailing, time stop and partial exits,
//!   guarded by a stop ratchet
//! - Strategy contexts in a registry, talking to collaborators through traits
//!   (market data, order gateway, notifications, event subscribers)

pub mod config;
pub mod confirmation;
pub mod data;
pub mod domain;
pub mod error;
pub mod events;
pub mod execution;
pub mod exit;
pub mod indicators;
pub mod levels;
pub mod notify;
pub mod orchestrator;
pub mod performance;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, StrategyConfig};
pub use error::CoreError;
pub use orchestrator::{ContextKey, StrategyContext, StrategyRegistry};
