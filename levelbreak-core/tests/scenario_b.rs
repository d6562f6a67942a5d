//! Breakeven on a long position: the stop moves once and stays put.

mod common;

use chrono::Duration;
use common::*;
use levelbreak_core::config::StrategyConfig;
use levelbreak_core::data::InMemoryFeed;
use levelbreak_core::domain::{Instrument, Quote, Side, Timeframe};
use levelbreak_core::events::PipelineEvent;
use levelbreak_core::execution::{OrderGateway, PaperGateway, TradeIntent};
use levelbreak_core::exit::{ExitManager, ExitObservation, ExitParams, ExitType, StopSource};
use levelbreak_core::notify::NullNotifier;
use levelbreak_core::{ContextKey, StrategyContext, StrategyRegistry};

fn manager() -> ExitManager {
    let params = ExitParams::from_config(&StrategyConfig::default(), &Instrument::forex("EURUSD"));
    let mut exits = ExitManager::new(params);
    exits.begin(11, Side::Long, 1.1000, 1.0950, 1.1100, 0.1, t0());
    exits
}

#[test]
fn breakeven_moves_stop_once() {
    let mut exits = manager();

    let intents = exits.update(&ExitObservation::at(1.1017, t0() + Duration::minutes(5)));
    assert_eq!(intents.len(), 1);
    let TradeIntent::ModifyStop { ticket, new_stop } = intents[0] else {
        panic!("expected a stop modification, got {intents:?}");
    };
    assert_eq!(ticket, 11);
    assert!((new_stop - 1.1002).abs() < 1e-9);

    let state = exits.state().unwrap();
    assert!(state.breakeven_set);
    assert_eq!(state.stop_source, StopSource::Breakeven);

    // Broker confirms the new stop; further profit below the trailing start
    // changes nothing.
    let mut obs = ExitObservation::at(1.1019, t0() + Duration::minutes(10));
    obs.observed_stop = Some(1.1002);
    assert!(exits.update(&obs).is_empty());
    assert!((exits.state().unwrap().current_stop - 1.1002).abs() < 1e-9);
    assert_eq!(exits.performance().stop_modifications, 1);
}

#[test]
fn pullback_after_breakeven_exits_at_the_stop() {
    let mut exits = manager();
    exits.update(&ExitObservation::at(1.1017, t0()));
    assert!(exits.update(&ExitObservation::at(1.1005, t0())).is_empty());
    assert_eq!(exits.check_exit_conditions(1.1005), None);
    assert_eq!(exits.check_exit_conditions(1.1001), Some(ExitType::Breakeven));
}

#[test]
fn breakeven_through_the_pipeline() {
    let mut bars = oscillating_bars();
    bars.extend((50..53).map(breakout_bar));
    let key = ContextKey::new("EURUSD", Timeframe::H1);
    let config = StrategyConfig {
        lookback_period: Some(50),
        touch_zone: Some(10.0),
        volume_threshold: 2.0,
        ..StrategyConfig::default()
    };

    let mut feed = InMemoryFeed::new();
    feed.insert_series("EURUSD", Timeframe::H1, bars.clone(), 50);
    let mut registry = StrategyRegistry::new(feed, PaperGateway::new(), NullNotifier);
    registry
        .register(StrategyContext::new(key.clone(), Instrument::forex("EURUSD"), config).unwrap())
        .unwrap();
    registry.update(&key).unwrap();
    for bar in &bars[50..] {
        registry.market_mut().advance("EURUSD", Timeframe::H1);
        registry.gateway_mut().set_mark(bar.close);
        registry.update(&key).unwrap();
    }
    let ticket = registry.context(&key).unwrap().ticket().expect("position opened");

    // Entry 1.1860, stop 1.1810; +17 pips moves the stop to entry + 2 pips.
    let last = bars[52].timestamp;
    let tick = |minutes: i64, price: f64| Quote {
        timestamp: last + Duration::minutes(minutes),
        bid: price,
        ask: price,
        volume: 0,
    };

    registry.market_mut().set_quote("EURUSD", tick(10, 1.1877));
    let report = registry.update(&key).unwrap();
    assert!(!report.new_bar);
    assert_eq!(report.events.len(), 1, "events: {:?}", report.events);
    let PipelineEvent::StopModified { stop, .. } = report.events[0] else {
        panic!("expected a stop modification");
    };
    assert!((stop - 1.1862).abs() < 1e-9);
    assert!((registry.gateway().position(ticket).unwrap().stop - 1.1862).abs() < 1e-9);

    registry.market_mut().set_quote("EURUSD", tick(20, 1.1879));
    let report = registry.update(&key).unwrap();
    assert!(report.events.is_empty());
    assert!(report.intents.is_empty());
    assert!((registry.gateway().position(ticket).unwrap().stop - 1.1862).abs() < 1e-9);
}
