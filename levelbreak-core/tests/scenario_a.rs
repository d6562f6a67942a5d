//! Two levels from an oscillating series, then a sustained breakout.

mod common;

use common::*;
use levelbreak_core::config::StrategyConfig;
use levelbreak_core::confirmation::ConfirmationOutcome;
use levelbreak_core::data::InMemoryFeed;
use levelbreak_core::domain::{Instrument, Side, Timeframe};
use levelbreak_core::events::PipelineEvent;
use levelbreak_core::execution::{OrderGateway, PaperGateway, TradeIntent};
use levelbreak_core::levels::{detect_levels, DetectorParams};
use levelbreak_core::notify::NullNotifier;
use levelbreak_core::{ContextKey, StrategyContext, StrategyRegistry};

fn scenario_config() -> StrategyConfig {
    StrategyConfig {
        lookback_period: Some(50),
        touch_zone: Some(10.0),
        min_touches: 3,
        min_strength: 0.5,
        volume_threshold: 2.0,
        min_candles: 3,
        ..StrategyConfig::default()
    }
}

// ── Detection ──

#[test]
fn detects_one_support_and_one_resistance() {
    let bars = oscillating_bars();
    assert_eq!(bars.len(), 50);

    let params = DetectorParams::new(50, 0.0010, 3, 0.5).with_movement_multiplier(2.0);
    let levels = detect_levels(&bars, &params);
    assert_eq!(levels.len(), 2, "levels: {levels:?}");

    let support = &levels[0];
    assert!((support.price - SUPPORT).abs() < 1e-9);
    assert!(!support.is_resistance);
    assert_eq!(support.touch_count, 4);
    assert_eq!(support.first_touch, bars[3].timestamp);
    assert_eq!(support.last_touch, bars[35].timestamp);
    // 0.65 × (1 + 0.05 recency + 0.10 span)
    assert!((support.strength - 0.7475).abs() < 1e-9);

    let resistance = &levels[1];
    assert!((resistance.price - RESISTANCE).abs() < 1e-9);
    assert!(resistance.is_resistance);
    assert_eq!(resistance.touch_count, 4);
    assert!((resistance.strength - 0.8125).abs() < 1e-9);
}

#[test]
fn resolved_params_match_explicit_ones() {
    let resolved = DetectorParams::resolve(
        &scenario_config(),
        Timeframe::H1,
        &Instrument::forex("EURUSD"),
    );
    assert_eq!(resolved.lookback, 50);
    assert!((resolved.touch_zone - 0.0010).abs() < 1e-12);
    assert_eq!(resolved.movement_multiplier, 2.0);
    assert_eq!(detect_levels(&oscillating_bars(), &resolved).len(), 2);
}

// ── Pipeline ──

#[test]
fn breakout_confirms_on_third_sustained_bar_and_opens_long() {
    let mut bars = oscillating_bars();
    bars.extend((50..53).map(breakout_bar));

    let key = ContextKey::new("EURUSD", Timeframe::H1);
    let mut feed = InMemoryFeed::new();
    feed.insert_series("EURUSD", Timeframe::H1, bars.clone(), 50);

    let mut registry = StrategyRegistry::new(feed, PaperGateway::new(), NullNotifier);
    let context =
        StrategyContext::new(key.clone(), Instrument::forex("EURUSD"), scenario_config()).unwrap();
    registry.register(context).unwrap();

    let report = registry.update(&key).unwrap();
    assert_eq!(report.levels.len(), 2);
    assert!(report.errors.is_empty());
    assert!(report
        .events
        .iter()
        .any(|e| matches!(e, PipelineEvent::LevelsChanged { .. })));

    let mut resolved_at = None;
    for i in 50..53 {
        registry.market_mut().advance("EURUSD", Timeframe::H1);
        registry.gateway_mut().set_mark(bars[i].close);
        let report = registry.update(&key).unwrap();
        assert!(report.errors.is_empty(), "errors at bar {i}: {:?}", report.errors);

        if i == 50 {
            assert!(report.events.iter().any(|e| matches!(
                e,
                PipelineEvent::BreakoutStarted { level, .. } if (level - RESISTANCE).abs() < 1e-9
            )));
        }
        if let Some(PipelineEvent::BreakoutResolved { outcome, .. }) = report
            .events
            .iter()
            .find(|e| matches!(e, PipelineEvent::BreakoutResolved { .. }))
        {
            assert_eq!(*outcome, ConfirmationOutcome::Confirmed);
            resolved_at = Some(i);
            assert!(matches!(
                report.intents.as_slice(),
                [TradeIntent::OpenPosition { side: Side::Long, .. }]
            ));
        }
    }
    assert_eq!(resolved_at, Some(52));

    let context = registry.context(&key).unwrap();
    let perf = context.confirmations().performance();
    assert_eq!(perf.confirmed, 1);
    assert_eq!(perf.avg_bars_to_confirm(), Some(3.0));

    let ticket = context.ticket().unwrap();
    let position = registry.gateway().position(ticket).unwrap();
    assert!((position.entry_price - 1.1860).abs() < 1e-9);
    assert!((position.stop - 1.1810).abs() < 1e-9);
    assert!((position.target - 1.1960).abs() < 1e-9);
}

#[test]
fn broken_resistance_reports_as_support() {
    let mut bars = oscillating_bars();
    bars.push(breakout_bar(50));

    let key = ContextKey::new("EURUSD", Timeframe::H1);
    let mut feed = InMemoryFeed::new();
    feed.insert_series("EURUSD", Timeframe::H1, bars, 51);
    let mut registry = StrategyRegistry::new(feed, PaperGateway::new(), NullNotifier);
    registry
        .register(StrategyContext::new(key.clone(), Instrument::forex("EURUSD"), scenario_config()).unwrap())
        .unwrap();
    registry.update(&key).unwrap();

    let report = registry.report(&key).unwrap();
    assert!(report.levels.iter().all(|l| !l.is_resistance));
    assert_eq!(report.awaiting.len(), 1);
    // Reporting twice changes nothing
    let again = registry.report(&key).unwrap();
    assert_eq!(report.levels, again.levels);
}
