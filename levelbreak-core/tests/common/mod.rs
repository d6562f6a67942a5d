#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use levelbreak_core::domain::Bar;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

pub fn bar_at(i: usize, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Bar {
    Bar {
        timestamp: t0() + Duration::hours(i as i64),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Linear path through `(index, close)` anchors, one close per index.
pub fn interpolate(anchors: &[(usize, f64)]) -> Vec<f64> {
    let mut closes = Vec::new();
    for pair in anchors.windows(2) {
        let ((a, pa), (b, pb)) = (pair[0], pair[1]);
        for i in a..b {
            closes.push(pa + (pb - pa) * (i - a) as f64 / (b - a) as f64);
        }
    }
    if let Some(&(_, last)) = anchors.last() {
        closes.push(last);
    }
    closes
}

pub const SUPPORT: f64 = 1.1700;
pub const RESISTANCE: f64 = 1.1850;

/// 50 H1 bars oscillating between support 1.1700 (lows at bars 3, 10, 22, 35)
/// and resistance 1.1850 (highs at bars 6, 16, 28, 42), volume 1000.
pub fn oscillating_bars() -> Vec<Bar> {
    let closes = interpolate(&[
        (0, 1.1780),
        (3, 1.1703),
        (6, 1.1847),
        (10, 1.1703),
        (16, 1.1847),
        (22, 1.1703),
        (28, 1.1847),
        (35, 1.1703),
        (42, 1.1847),
        (49, 1.1780),
    ]);
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let low = if [3, 10, 22, 35].contains(&i) { SUPPORT } else { c - 0.0003 };
            let high = if [6, 16, 28, 42].contains(&i) { RESISTANCE } else { c + 0.0003 };
            bar_at(i, c, high, low, c, 1000)
        })
        .collect()
}

/// A bar closing at 1.1860 on 2.2× the base volume.
pub fn breakout_bar(i: usize) -> Bar {
    bar_at(i, 1.1855, 1.1863, 1.1852, 1.1860, 2200)
}

pub type PaperRegistry = levelbreak_core::StrategyRegistry<
    levelbreak_core::data::InMemoryFeed,
    levelbreak_core::execution::PaperGateway,
    levelbreak_core::notify::NullNotifier,
>;

/// Registry over `bars` with the first `visible` revealed and one EURUSD H1
/// context.
pub fn paper_registry(
    bars: Vec<Bar>,
    visible: usize,
    config: levelbreak_core::config::StrategyConfig,
) -> (PaperRegistry, levelbreak_core::ContextKey) {
    use levelbreak_core::domain::{Instrument, Timeframe};

    let key = levelbreak_core::ContextKey::new("EURUSD", Timeframe::H1);
    let mut feed = levelbreak_core::data::InMemoryFeed::new();
    feed.insert_series("EURUSD", Timeframe::H1, bars, visible);
    let mut registry = levelbreak_core::StrategyRegistry::new(
        feed,
        levelbreak_core::execution::PaperGateway::new(),
        levelbreak_core::notify::NullNotifier,
    );
    let context =
        levelbreak_core::StrategyContext::new(key.clone(), Instrument::forex("EURUSD"), config)
            .unwrap();
    registry.register(context).unwrap();
    (registry, key)
}

/// Reveal the next bar, mark the paper gateway at its close, run one cycle.
pub fn step(
    registry: &mut PaperRegistry,
    key: &levelbreak_core::ContextKey,
) -> levelbreak_core::orchestrator::CycleReport {
    use levelbreak_core::data::MarketDataProvider;

    registry
        .market_mut()
        .advance(&key.symbol, key.timeframe);
    let close = registry.market().quote(&key.symbol).unwrap().mid();
    registry.gateway_mut().set_mark(close);
    registry.update(key).unwrap()
}
