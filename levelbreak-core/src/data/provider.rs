//! Market data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over data sources (live terminal,
//! CSV replay, synthetic series) so contexts can be driven by any of them and
//! mocked in tests.

use crate::domain::{Bar, Quote, Timeframe};
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("timeframe {timeframe} not available for {symbol}")]
    TimeframeUnavailable { symbol: String, timeframe: Timeframe },

    #[error("no quote available for {symbol}")]
    NoQuote { symbol: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Source of bars and live quotes.
///
/// Contexts receive the provider as an injected capability on every update;
/// no engine owns or inherits from it.
pub trait MarketDataProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Up to `count` most recent bars, **newest first**.
    ///
    /// Returning fewer than `count` bars is not an error.
    fn bars(&self, symbol: &str, timeframe: Timeframe, count: usize)
        -> Result<Vec<Bar>, DataError>;

    /// Live bid/ask/volume snapshot.
    fn quote(&self, symbol: &str) -> Result<Quote, DataError>;
}
