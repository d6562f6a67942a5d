use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::state::{BreakoutType, ConfirmationOutcome, ConfirmationState};
use crate::config::StrategyConfig;
use crate::domain::Bar;
use crate::indicators::{volume_baseline, Indicator, Rsi};
use crate::levels::KeyLevel;
use crate::performance::ConfirmationPerformance;

/// Gate ratios are capped here before averaging into the score.
const SCORE_RATIO_CAP: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationParams {
    pub min_candles: usize,
    pub volume_threshold: f64,
    pub volume_period: usize,
    pub momentum_threshold: f64,
    pub momentum_period: usize,
    pub pattern_weight: f64,
    pub max_wait_bars: usize,
    /// Levels closer than this (price units) share one confirmation.
    pub touch_zone: f64,
}

impl ConfirmationParams {
    pub fn from_config(config: &StrategyConfig, touch_zone: f64) -> Self {
        Self {
            min_candles: config.min_candles,
            volume_threshold: config.volume_threshold,
            volume_period: config.volume_period,
            momentum_threshold: config.momentum_threshold,
            momentum_period: config.momentum_period,
            pattern_weight: config.pattern_weight,
            max_wait_bars: config.max_wait_bars,
            touch_zone,
        }
    }
}

/// A breakout that left the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub state: ConfirmationState,
    pub outcome: ConfirmationOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// The level already has a breakout awaiting confirmation.
    Ignored,
    Awaiting,
    /// Resolved on the breakout bar itself.
    Resolved(Resolution),
}

#[derive(Debug, Clone)]
pub struct BreakoutConfirmationEngine {
    params: ConfirmationParams,
    momentum: Rsi,
    awaiting: Vec<ConfirmationState>,
    performance: ConfirmationPerformance,
}

impl BreakoutConfirmationEngine {
    pub fn new(params: ConfirmationParams) -> Self {
        Self {
            momentum: Rsi::new(params.momentum_period),
            params,
            awaiting: Vec::new(),
            performance: ConfirmationPerformance::default(),
        }
    }

    pub fn params(&self) -> &ConfirmationParams {
        &self.params
    }

    pub fn awaiting(&self) -> &[ConfirmationState] {
        &self.awaiting
    }

    /// Whether a breakout of the level at `price` is awaiting confirmation.
    pub fn is_awaiting(&self, price: f64) -> bool {
        self.awaiting
            .iter()
            .any(|s| s.level.is_near(price, self.params.touch_zone))
    }

    /// Start confirming a breakout of `level` on the last bar of `history`
    /// (chronological). The breakout bar is evaluated as the first candle.
    pub fn begin_confirmation(
        &mut self,
        level: &KeyLevel,
        breakout_type: BreakoutType,
        history: &[Bar],
    ) -> BeginOutcome {
        let Some(bar) = history.last() else {
            return BeginOutcome::Ignored;
        };
        if self.is_awaiting(level.price) {
            self.performance.ignored += 1;
            debug!(
                level = level.price,
                breakout = %breakout_type,
                "breakout ignored, level already awaiting confirmation"
            );
            return BeginOutcome::Ignored;
        }

        let mut state = ConfirmationState {
            level: level.clone(),
            breakout_type,
            start_time: bar.timestamp,
            breakout_price: bar.close,
            confirmed_candles: 0,
            bars_elapsed: 0,
            volume_ratio: 0.0,
            volume_baseline: volume_baseline(history, history.len() - 1, self.params.volume_period),
            momentum_value: 0.0,
            score: 0.0,
        };
        self.performance.started += 1;
        info!(
            level = level.price,
            breakout = %breakout_type,
            price = bar.close,
            baseline_volume = state.volume_baseline,
            "breakout detected, awaiting confirmation"
        );

        let outcome = self.evaluate(&mut state, history);
        if outcome.is_resolved() {
            BeginOutcome::Resolved(self.resolve(state, outcome))
        } else {
            self.awaiting.push(state);
            BeginOutcome::Awaiting
        }
    }

    /// Advance every awaiting breakout by the last bar of `history` and
    /// return the ones that resolved.
    pub fn update_confirmation_state(&mut self, history: &[Bar]) -> Vec<Resolution> {
        if history.is_empty() {
            return Vec::new();
        }
        let mut resolved = Vec::new();
        for mut state in std::mem::take(&mut self.awaiting) {
            let outcome = self.evaluate(&mut state, history);
            if outcome.is_resolved() {
                resolved.push(self.resolve(state, outcome));
            } else {
                self.awaiting.push(state);
            }
        }
        resolved
    }

    fn evaluate(&self, state: &mut ConfirmationState, history: &[Bar]) -> ConfirmationOutcome {
        let Some(bar) = history.last() else {
            return ConfirmationOutcome::Pending;
        };
        let p = &self.params;
        state.bars_elapsed += 1;

        state.volume_ratio = state
            .volume_baseline
            .map_or(0.0, |baseline| bar.volume as f64 / baseline);
        let rsi = self.momentum.latest(history).unwrap_or(50.0);
        state.momentum_value = match state.breakout_type {
            BreakoutType::Bullish => rsi,
            BreakoutType::Bearish => 100.0 - rsi,
        };

        if !state.breakout_type.is_beyond(bar.close, state.level.price) {
            return ConfirmationOutcome::Invalidated;
        }
        state.confirmed_candles += 1;

        let close_location = match state.breakout_type {
            BreakoutType::Bullish => bar.close_location(),
            BreakoutType::Bearish => 1.0 - bar.close_location(),
        };
        let gates = [
            gate_ratio(state.confirmed_candles as f64, p.min_candles as f64),
            gate_ratio(state.volume_ratio, p.volume_threshold),
            gate_ratio(state.momentum_value, p.momentum_threshold),
        ];
        state.score = gates.iter().sum::<f64>() / gates.len() as f64 + p.pattern_weight * close_location;

        let passed = state.confirmed_candles >= p.min_candles
            && state.volume_ratio >= p.volume_threshold
            && state.momentum_value >= p.momentum_threshold;
        if passed {
            ConfirmationOutcome::Confirmed
        } else if state.bars_elapsed > p.max_wait_bars {
            ConfirmationOutcome::TimedOut
        } else {
            debug!(
                level = state.level.price,
                candles = state.confirmed_candles,
                volume_ratio = state.volume_ratio,
                momentum = state.momentum_value,
                score = state.score,
                "breakout pending"
            );
            ConfirmationOutcome::Pending
        }
    }

    fn resolve(&mut self, state: ConfirmationState, outcome: ConfirmationOutcome) -> Resolution {
        match outcome {
            ConfirmationOutcome::Confirmed => self.performance.record_confirmed(state.bars_elapsed),
            ConfirmationOutcome::Invalidated => self.performance.invalidated += 1,
            ConfirmationOutcome::TimedOut => self.performance.timed_out += 1,
            ConfirmationOutcome::Pending => {}
        }
        info!(
            level = state.level.price,
            breakout = %state.breakout_type,
            outcome = ?outcome,
            candles = state.confirmed_candles,
            bars = state.bars_elapsed,
            volume_ratio = state.volume_ratio,
            momentum = state.momentum_value,
            score = state.score,
            "breakout resolved"
        );
        Resolution { state, outcome }
    }

    /// Drop every awaiting breakout.
    pub fn clear(&mut self) {
        self.awaiting.clear();
    }

    /// Restore persisted states after a restart.
    pub fn restore(&mut self, states: Vec<ConfirmationState>) {
        self.awaiting = states;
    }

    pub fn performance(&self) -> &ConfirmationPerformance {
        &self.performance
    }

    pub fn take_performance(&mut self) -> ConfirmationPerformance {
        std::mem::take(&mut self.performance)
    }
}

fn gate_ratio(value: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        SCORE_RATIO_CAP
    } else {
        (value / threshold).clamp(0.0, SCORE_RATIO_CAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bar, start_time};

    fn level(price: f64) -> KeyLevel {
        KeyLevel {
            price,
            is_resistance: true,
            touch_count: 3,
            first_touch: start_time(),
            last_touch: start_time(),
            strength: 0.7,
        }
    }

    fn params() -> ConfirmationParams {
        ConfirmationParams {
            min_candles: 3,
            volume_threshold: 2.0,
            volume_period: 5,
            momentum_threshold: 0.0,
            momentum_period: 3,
            pattern_weight: 0.1,
            max_wait_bars: 5,
            touch_zone: 0.0010,
        }
    }

    /// Five flat bars at 1.0 with volume 1000.
    fn base() -> Vec<Bar> {
        (0..5).map(|i| bar(i, 1.0, 1.001, 0.999, 1.0, 1000)).collect()
    }

    fn push(history: &mut Vec<Bar>, close: f64, volume: u64) {
        let i = history.len() as i64;
        history.push(bar(i, close, close + 0.0005, close - 0.0005, close, volume));
    }

    #[test]
    fn confirms_on_third_sustained_candle() {
        let mut engine = BreakoutConfirmationEngine::new(params());
        let mut history = base();
        push(&mut history, 1.0020, 2200);
        assert_eq!(
            engine.begin_confirmation(&level(1.0010), BreakoutType::Bullish, &history),
            BeginOutcome::Awaiting
        );
        assert_eq!(engine.awaiting()[0].volume_baseline, Some(1000.0));

        push(&mut history, 1.0020, 2200);
        assert!(engine.update_confirmation_state(&history).is_empty());
        push(&mut history, 1.0020, 2200);
        let resolved = engine.update_confirmation_state(&history);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(resolved[0].state.confirmed_candles, 3);
        assert!((resolved[0].state.volume_ratio - 2.2).abs() < 1e-12);
        assert!(engine.awaiting().is_empty());
        assert_eq!(engine.performance().confirmed, 1);
        assert_eq!(engine.performance().avg_bars_to_confirm(), Some(3.0));
    }

    #[test]
    fn low_volume_waits_then_times_out() {
        let mut engine = BreakoutConfirmationEngine::new(params());
        let mut history = base();
        push(&mut history, 1.0020, 1500);
        engine.begin_confirmation(&level(1.0010), BreakoutType::Bullish, &history);
        for _ in 0..4 {
            push(&mut history, 1.0020, 1500);
            assert!(engine.update_confirmation_state(&history).is_empty());
        }
        assert_eq!(engine.awaiting()[0].confirmed_candles, 5);
        push(&mut history, 1.0020, 1500);
        let resolved = engine.update_confirmation_state(&history);
        assert_eq!(resolved[0].outcome, ConfirmationOutcome::TimedOut);
        assert_eq!(engine.performance().timed_out, 1);
    }

    #[test]
    fn close_back_through_level_invalidates() {
        let mut engine = BreakoutConfirmationEngine::new(params());
        let mut history = base();
        push(&mut history, 1.0020, 2200);
        engine.begin_confirmation(&level(1.0010), BreakoutType::Bullish, &history);
        push(&mut history, 1.0005, 2200);
        let resolved = engine.update_confirmation_state(&history);
        assert_eq!(resolved[0].outcome, ConfirmationOutcome::Invalidated);
        assert_eq!(engine.performance().invalidated, 1);
    }

    #[test]
    fn one_confirmation_per_level() {
        let mut engine = BreakoutConfirmationEngine::new(params());
        let mut history = base();
        push(&mut history, 1.0020, 2200);
        engine.begin_confirmation(&level(1.0010), BreakoutType::Bullish, &history);
        // 0.0005 away: same level within the touch zone
        assert_eq!(
            engine.begin_confirmation(&level(1.0015), BreakoutType::Bullish, &history),
            BeginOutcome::Ignored
        );
        assert_eq!(engine.awaiting().len(), 1);
        assert_eq!(engine.performance().ignored, 1);
    }

    #[test]
    fn score_never_bypasses_gates() {
        let p = ConfirmationParams {
            pattern_weight: 1.0,
            ..params()
        };
        let mut engine = BreakoutConfirmationEngine::new(p);
        let mut history = base();
        // Huge volume and a close at the high, but only one candle so far
        push(&mut history, 1.0020, 100_000);
        engine.begin_confirmation(&level(1.0010), BreakoutType::Bullish, &history);
        let state = &engine.awaiting()[0];
        assert!(state.score > 1.0);
        assert_eq!(state.confirmed_candles, 1);
    }

    #[test]
    fn bearish_momentum_is_mirrored() {
        let p = ConfirmationParams {
            min_candles: 1,
            volume_threshold: 0.0,
            momentum_threshold: 60.0,
            ..params()
        };
        let mut engine = BreakoutConfirmationEngine::new(p);
        let mut history = base();
        push(&mut history, 0.9990, 1000);
        push(&mut history, 0.9970, 1000);
        // Three straight down closes after a flat stretch: RSI 0, mirrored to 100
        push(&mut history, 0.9950, 1000);
        let outcome = engine.begin_confirmation(&level(0.9960), BreakoutType::Bearish, &history);
        match outcome {
            BeginOutcome::Resolved(r) => {
                assert_eq!(r.outcome, ConfirmationOutcome::Confirmed);
                assert_eq!(r.state.momentum_value, 100.0);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
    }
}
