//! Orchestration: one isolated [`StrategyContext`] per `(symbol, timeframe)`,
//! held in a [`StrategyRegistry`] together with the injected collaborators.

pub mod context;
pub mod registry;

pub use context::{ContextReport, CycleReport, StrategyContext};
pub use registry::StrategyRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Timeframe;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl ContextKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, self.timeframe)
    }
}
