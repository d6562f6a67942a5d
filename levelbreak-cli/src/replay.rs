//! Bar-by-bar replay of one context through the full pipeline.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use levelbreak_core::data::{InMemoryFeed, MarketDataProvider};
use levelbreak_core::domain::{Bar, Instrument, Timeframe};
use levelbreak_core::events::{EventSink, PipelineEvent};
use levelbreak_core::execution::PaperGateway;
use levelbreak_core::notify::LogNotifier;
use levelbreak_core::orchestrator::ContextReport;
use levelbreak_core::performance::PeriodReport;
use levelbreak_core::{ContextKey, StrategyConfig, StrategyContext, StrategyRegistry};
use serde::Serialize;
use tracing::{info, warn};

/// One published event with the time of the cycle that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct TimedEvent {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

#[derive(Debug, Serialize)]
pub struct ReplaySummary {
    pub key: ContextKey,
    pub bars: usize,
    pub warmup: usize,
    pub events: Vec<TimedEvent>,
    /// Recoverable errors reported by the cycles, as text.
    pub errors: Vec<String>,
    pub periods: Vec<PeriodReport>,
    pub realized_pnl: f64,
    /// Positions closed by a resting stop or target inside a bar.
    pub resting_fills: usize,
    pub open_positions: usize,
    pub report: ContextReport,
}

/// Collects events for the summary; shared with the registry.
#[derive(Clone, Default)]
struct Recorder {
    time: Rc<RefCell<Option<DateTime<Utc>>>>,
    events: Rc<RefCell<Vec<TimedEvent>>>,
}

impl EventSink for Recorder {
    fn on_event(&mut self, key: &ContextKey, event: &PipelineEvent) {
        let Some(time) = *self.time.borrow() else {
            return;
        };
        info!(context = %key, event = event.name(), "event");
        self.events.borrow_mut().push(TimedEvent {
            time,
            event: event.clone(),
        });
    }
}

/// Replay `bars` (chronological). The first `lookback` bars are revealed
/// before the first cycle so detection starts on a full window.
pub fn replay(
    bars: Vec<Bar>,
    instrument: Instrument,
    timeframe: Timeframe,
    config: StrategyConfig,
) -> Result<ReplaySummary> {
    let key = ContextKey::new(instrument.symbol.clone(), timeframe);
    let context = StrategyContext::new(key.clone(), instrument, config)
        .context("invalid strategy configuration")?;
    let warmup = context.detector().params().lookback.min(bars.len()).max(1);
    let total = bars.len();

    let mut feed = InMemoryFeed::new();
    feed.insert_series(key.symbol.clone(), timeframe, bars, warmup);
    let mut registry = StrategyRegistry::new(feed, PaperGateway::new(), LogNotifier);
    registry.register(context)?;

    let recorder = Recorder::default();
    registry.subscribe(Box::new(recorder.clone()));

    let mut errors = Vec::new();
    let mut periods = Vec::new();
    let mut resting_fills = 0;
    loop {
        let quote = registry.market().quote(&key.symbol)?;
        registry.gateway_mut().set_mark(quote.mid());
        *recorder.time.borrow_mut() = Some(quote.timestamp);

        let cycle = registry.update(&key)?;
        for err in &cycle.errors {
            warn!(time = %cycle.time, error = %err, "cycle error");
            errors.push(format!("{}: {err}", cycle.time));
        }
        periods.extend(cycle.period_closed);

        if !registry.market_mut().advance(&key.symbol, timeframe) {
            break;
        }
        // Resting orders see the whole range of the new bar before the cycle.
        if let Some(bar) = registry.market().bars(&key.symbol, timeframe, 1)?.first() {
            for fill in registry.gateway_mut().process_bar(bar) {
                info!(
                    time = %bar.timestamp,
                    intent = %fill.intent,
                    price = fill.price,
                    "resting order filled"
                );
                resting_fills += 1;
            }
        }
    }

    let report = registry.report(&key)?;
    let gateway = registry.gateway();
    let events = recorder.events.borrow().clone();
    info!(
        bars = total,
        events = events.len(),
        fills = gateway.fills().len(),
        realized_pnl = gateway.realized_pnl(),
        "replay complete"
    );

    Ok(ReplaySummary {
        key,
        bars: total,
        warmup,
        events,
        errors,
        periods,
        realized_pnl: gateway.realized_pnl(),
        resting_fills,
        open_positions: gateway.open_positions(),
        report,
    })
}
