//! In-memory replay feed.
//!
//! Holds full chronological series per `(symbol, timeframe)` and exposes only
//! the bars up to a cursor, so a recorded or synthetic series can be replayed
//! through the pipeline one bar at a time.

use std::collections::HashMap;

use super::provider::{DataError, MarketDataProvider};
use crate::domain::{Bar, Quote, Timeframe};

#[derive(Debug, Clone)]
struct Series {
    bars: Vec<Bar>,
    visible: usize,
}

/// Replay provider over preloaded series.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeed {
    series: HashMap<(String, Timeframe), Series>,
    quotes: HashMap<String, Quote>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a chronological series with the first `visible` bars revealed.
    pub fn insert_series(
        &mut self,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        bars: Vec<Bar>,
        visible: usize,
    ) {
        let visible = visible.min(bars.len());
        self.series
            .insert((symbol.into(), timeframe), Series { bars, visible });
    }

    /// Reveal the next bar. Returns false once the series is exhausted.
    pub fn advance(&mut self, symbol: &str, timeframe: Timeframe) -> bool {
        match self.series.get_mut(&(symbol.to_string(), timeframe)) {
            Some(series) if series.visible < series.bars.len() => {
                series.visible += 1;
                // A bar close supersedes any intrabar quote override.
                self.quotes.remove(symbol);
                true
            }
            _ => false,
        }
    }

    /// Number of bars currently visible.
    pub fn visible(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map_or(0, |s| s.visible)
    }

    /// Total bars loaded.
    pub fn len(&self, symbol: &str, timeframe: Timeframe) -> usize {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map_or(0, |s| s.bars.len())
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Override the live quote (intrabar ticks) until the next `advance`.
    pub fn set_quote(&mut self, symbol: impl Into<String>, quote: Quote) {
        self.quotes.insert(symbol.into(), quote);
    }

    fn last_visible_bar(&self, symbol: &str) -> Option<&Bar> {
        // Finest timeframe first: its last bar is the most recent price.
        Timeframe::ALL.iter().find_map(|tf| {
            self.series
                .get(&(symbol.to_string(), *tf))
                .and_then(|s| s.bars[..s.visible].last())
        })
    }
}

impl MarketDataProvider for InMemoryFeed {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, DataError> {
        let series = self
            .series
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| {
                if self.series.keys().any(|(s, _)| s == symbol) {
                    DataError::TimeframeUnavailable {
                        symbol: symbol.to_string(),
                        timeframe,
                    }
                } else {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                }
            })?;

        Ok(series.bars[..series.visible]
            .iter()
            .rev()
            .take(count)
            .cloned()
            .collect())
    }

    fn quote(&self, symbol: &str) -> Result<Quote, DataError> {
        if let Some(quote) = self.quotes.get(symbol) {
            return Ok(quote.clone());
        }
        self.last_visible_bar(symbol)
            .map(Quote::from_bar)
            .ok_or_else(|| DataError::NoQuote {
                symbol: symbol.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 1.10 + i as f64 * 0.001;
                Bar {
                    timestamp: start + Duration::hours(i as i64),
                    open: close,
                    high: close + 0.0005,
                    low: close - 0.0005,
                    close,
                    volume: 100 + i as u64,
                }
            })
            .collect()
    }

    #[test]
    fn bars_are_newest_first_and_capped() {
        let mut feed = InMemoryFeed::new();
        feed.insert_series("EURUSD", Timeframe::H1, bars(10), 5);

        let got = feed.bars("EURUSD", Timeframe::H1, 3).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].volume, 104);
        assert_eq!(got[2].volume, 102);

        // Fewer than requested is fine
        let got = feed.bars("EURUSD", Timeframe::H1, 100).unwrap();
        assert_eq!(got.len(), 5);
    }

    #[test]
    fn advance_reveals_next_bar_until_exhausted() {
        let mut feed = InMemoryFeed::new();
        feed.insert_series("EURUSD", Timeframe::H1, bars(2), 1);
        assert!(feed.advance("EURUSD", Timeframe::H1));
        assert_eq!(feed.visible("EURUSD", Timeframe::H1), 2);
        assert!(!feed.advance("EURUSD", Timeframe::H1));
    }

    #[test]
    fn quote_follows_last_visible_close_unless_overridden() {
        let mut feed = InMemoryFeed::new();
        feed.insert_series("EURUSD", Timeframe::H1, bars(10), 3);
        let quote = feed.quote("EURUSD").unwrap();
        assert!((quote.mid() - 1.102).abs() < 1e-12);

        let mut tick = quote.clone();
        tick.bid = 1.2;
        tick.ask = 1.2;
        feed.set_quote("EURUSD", tick);
        assert!((feed.quote("EURUSD").unwrap().mid() - 1.2).abs() < 1e-12);

        feed.advance("EURUSD", Timeframe::H1);
        assert!((feed.quote("EURUSD").unwrap().mid() - 1.103).abs() < 1e-12);
    }

    #[test]
    fn unknown_symbol_and_timeframe_errors() {
        let mut feed = InMemoryFeed::new();
        feed.insert_series("EURUSD", Timeframe::H1, bars(3), 3);
        assert!(matches!(
            feed.bars("GBPUSD", Timeframe::H1, 5),
            Err(DataError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            feed.bars("EURUSD", Timeframe::D1, 5),
            Err(DataError::TimeframeUnavailable { .. })
        ));
        assert!(matches!(feed.quote("GBPUSD"), Err(DataError::NoQuote { .. })));
    }
}
