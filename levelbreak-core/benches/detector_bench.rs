//! Criterion benchmarks for the per-bar hot paths.
//!
//! 1. Level detection over a full lookback window
//! 2. Breakout confirmation bookkeeping
//! 3. Exit manager update

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use levelbreak_core::config::StrategyConfig;
use levelbreak_core::confirmation::{
    BreakoutConfirmationEngine, BreakoutType, ConfirmationParams,
};
use levelbreak_core::domain::{Bar, Instrument, Side};
use levelbreak_core::exit::{ExitManager, ExitObservation, ExitParams};
use levelbreak_core::levels::{detect_levels, DetectorParams};

fn make_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 1.1000 + (i as f64 * 0.15).sin() * 0.0060 + (i as f64 * 0.03).cos() * 0.0020;
            Bar {
                timestamp: start + Duration::hours(i as i64),
                open: close - 0.0002,
                high: close + 0.0006,
                low: close - 0.0006,
                close,
                volume: 1_000 + (i as u64 % 400),
            }
        })
        .collect()
}

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_levels");
    for lookback in [52usize, 100, 200] {
        let bars = make_bars(lookback);
        let params = DetectorParams::new(lookback, 0.0015, 3, 0.5).with_movement_multiplier(2.0);
        group.bench_with_input(BenchmarkId::from_parameter(lookback), &bars, |b, bars| {
            b.iter(|| detect_levels(black_box(bars), &params))
        });
    }
    group.finish();
}

fn bench_confirmation(c: &mut Criterion) {
    let bars = make_bars(60);
    let config = StrategyConfig::default();
    let params = ConfirmationParams::from_config(&config, 0.0015);
    let levels = detect_levels(&bars, &DetectorParams::new(60, 0.0015, 1, 0.0));

    c.bench_function("confirmation_cycle", |b| {
        b.iter(|| {
            let mut engine = BreakoutConfirmationEngine::new(params.clone());
            for level in &levels {
                let kind = if level.price > bars[59].close {
                    BreakoutType::Bearish
                } else {
                    BreakoutType::Bullish
                };
                engine.begin_confirmation(level, kind, &bars);
            }
            black_box(engine.update_confirmation_state(&bars))
        })
    });
}

fn bench_exit_update(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let params = ExitParams::from_config(&StrategyConfig::default(), &Instrument::forex("EURUSD"));

    c.bench_function("exit_update_100_ticks", |b| {
        b.iter(|| {
            let mut exits = ExitManager::new(params.clone());
            exits.begin(1, Side::Long, 1.1000, 1.0950, 1.1100, 1.0, start);
            for i in 0..100 {
                let price = 1.1000 + i as f64 * 0.00008;
                let obs = ExitObservation::at(price, start + Duration::minutes(i));
                black_box(exits.update(&obs));
            }
        })
    });
}

criterion_group!(benches, bench_detection, bench_confirmation, bench_exit_update);
criterion_main!(benches);
