//! Key level detector: window → swings → clusters → touches → strength.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cluster::cluster_swings;
use super::strength::{score_strength, StrengthInputs};
use super::swing::find_swings;
use super::touch::count_touches;
use super::KeyLevel;
use crate::config::{ScoringConfig, StrategyConfig};
use crate::domain::{Bar, Instrument, Timeframe};
use crate::performance::LevelPerformance;

/// Resolved detection parameters, distances in price units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    pub lookback: usize,
    pub touch_zone: f64,
    pub min_touches: usize,
    pub min_strength: f64,
    pub movement_multiplier: f64,
    pub swing_high_window: usize,
    pub swing_low_window: usize,
    pub scoring: ScoringConfig,
}

impl DetectorParams {
    /// Explicit parameters with unit movement multiplier and two-bar swing windows.
    pub fn new(lookback: usize, touch_zone: f64, min_touches: usize, min_strength: f64) -> Self {
        Self {
            lookback,
            touch_zone,
            min_touches,
            min_strength,
            movement_multiplier: 1.0,
            swing_high_window: 2,
            swing_low_window: 2,
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_movement_multiplier(mut self, multiplier: f64) -> Self {
        self.movement_multiplier = multiplier;
        self
    }

    pub fn with_swing_windows(mut self, high: usize, low: usize) -> Self {
        self.swing_high_window = high;
        self.swing_low_window = low;
        self
    }

    /// Fill unset detection fields from the timeframe table and convert pips to price.
    pub fn resolve(config: &StrategyConfig, timeframe: Timeframe, instrument: &Instrument) -> Self {
        let defaults = timeframe.defaults();
        let zone_pips = config.touch_zone.unwrap_or(defaults.touch_zone_pips);
        Self {
            lookback: config.lookback_period.unwrap_or(defaults.lookback),
            touch_zone: instrument.pips(zone_pips),
            min_touches: config.min_touches,
            min_strength: config.min_strength,
            movement_multiplier: config
                .movement_multiplier
                .unwrap_or(defaults.movement_multiplier),
            swing_high_window: config.swing_high_window,
            swing_low_window: config.swing_low_window,
            scoring: config.scoring.clone(),
        }
    }

    /// Fewest bars that can contain one confirmed swing.
    pub fn min_bars(&self) -> usize {
        2 * self.swing_high_window.max(self.swing_low_window) + 1
    }

    /// Excursion required between two counted touches.
    pub fn min_excursion(&self) -> f64 {
        self.touch_zone * self.movement_multiplier
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowTouchCount,
    LowStrength,
    MergedIntoExisting,
    NotScorable,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::LowTouchCount => "low_touch_count",
            RejectReason::LowStrength => "low_strength",
            RejectReason::MergedIntoExisting => "merged_into_existing",
            RejectReason::NotScorable => "not_scorable",
        }
    }
}

/// A candidate that did not become a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub price: f64,
    pub reason: RejectReason,
    pub touch_count: usize,
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Sorted by price, classified against the last close of the window.
    pub levels: Vec<KeyLevel>,
    pub rejections: Vec<Rejection>,
    /// Window shorter than one swing pattern.
    pub insufficient_history: bool,
}

/// Detect key levels over the most recent `lookback` bars (chronological).
pub fn detect_levels(bars: &[Bar], params: &DetectorParams) -> Vec<KeyLevel> {
    scan(bars, params).levels
}

/// Detection with its rejection record.
pub fn scan(bars: &[Bar], params: &DetectorParams) -> Detection {
    let window = &bars[bars.len().saturating_sub(params.lookback)..];
    if window.len() < params.min_bars() {
        debug!(
            available = window.len(),
            required = params.min_bars(),
            "not enough bars for level detection"
        );
        return Detection {
            insufficient_history: true,
            ..Detection::default()
        };
    }

    let swings = find_swings(window, params.swing_high_window, params.swing_low_window);
    let (clusters, merged) = cluster_swings(&swings, params.touch_zone);

    let mut detection = Detection::default();
    for m in merged {
        debug!(
            price = m.price,
            into = m.into,
            reason = RejectReason::MergedIntoExisting.as_str(),
            "level candidate rejected"
        );
        detection.rejections.push(Rejection {
            price: m.price,
            reason: RejectReason::MergedIntoExisting,
            touch_count: 0,
            strength: None,
        });
    }

    let newest = window.len() - 1;
    let reference = window[newest].close;
    for cluster in clusters {
        let Some(touches) =
            count_touches(window, cluster.price, params.touch_zone, params.min_excursion())
        else {
            continue;
        };

        let strength = score_strength(
            StrengthInputs {
                touch_count: touches.count,
                age: newest - touches.last_index,
                span: touches.last_index - touches.first_index,
                lookback: params.lookback,
            },
            &params.scoring,
        );

        let reason = if !strength.is_finite() {
            Some(RejectReason::NotScorable)
        } else if touches.count < params.min_touches {
            Some(RejectReason::LowTouchCount)
        } else if strength < params.min_strength {
            Some(RejectReason::LowStrength)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!(
                price = cluster.price,
                touches = touches.count,
                strength,
                reason = reason.as_str(),
                "level candidate rejected"
            );
            detection.rejections.push(Rejection {
                price: cluster.price,
                reason,
                touch_count: touches.count,
                strength: strength.is_finite().then_some(strength),
            });
            continue;
        }

        debug!(
            price = cluster.price,
            touches = touches.count,
            strength,
            "level accepted"
        );
        detection.levels.push(KeyLevel {
            price: cluster.price,
            is_resistance: cluster.price > reference,
            touch_count: touches.count,
            first_touch: window[touches.first_index].timestamp,
            last_touch: window[touches.last_index].timestamp,
            strength,
        });
    }

    detection
}

/// Stateful detector owned by one strategy context.
///
/// Each rescan is folded into the levels already known: a level the scan
/// confirms takes the fresh reading, and a level whose last touch has left the
/// window is re-scored as stale until it drops below `min_strength`. Reads go
/// through [`report`](Self::report), which reclassifies against the reference
/// price first.
#[derive(Debug, Clone)]
pub struct KeyLevelDetector {
    params: DetectorParams,
    levels: Vec<KeyLevel>,
    performance: LevelPerformance,
}

impl KeyLevelDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self {
            params,
            levels: Vec::new(),
            performance: LevelPerformance::default(),
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Fold a fresh scan of `bars` (chronological) into the level set.
    /// Returns true when the set of level prices or touch counts changed.
    pub fn rescan(&mut self, bars: &[Bar]) -> bool {
        let detection = scan(bars, &self.params);

        let perf = &mut self.performance;
        perf.scans += 1;
        if detection.insufficient_history {
            perf.insufficient_history += 1;
        }
        perf.accepted += detection.levels.len();
        for rejection in &detection.rejections {
            match rejection.reason {
                RejectReason::LowTouchCount => perf.rejected_low_touch_count += 1,
                RejectReason::LowStrength => perf.rejected_low_strength += 1,
                RejectReason::MergedIntoExisting => perf.merged_into_existing += 1,
                RejectReason::NotScorable => perf.not_scorable += 1,
            }
        }

        let mut levels = detection.levels;
        let window_start = bars.len().saturating_sub(self.params.lookback);
        if let (false, Some(oldest)) = (detection.insufficient_history, bars.get(window_start)) {
            for prior in &self.levels {
                if let Some(fresh) = levels
                    .iter_mut()
                    .find(|l| l.is_near(prior.price, self.params.touch_zone))
                {
                    fresh.first_touch = fresh.first_touch.min(prior.first_touch);
                    continue;
                }
                // Touched inside the window yet not accepted: the scan decides.
                if prior.last_touch >= oldest.timestamp {
                    continue;
                }
                if let Some(stale) = age_out(prior, bars, &self.params, &mut self.performance) {
                    levels.push(stale);
                }
            }
            levels.sort_by(|a, b| a.price.total_cmp(&b.price));
        }

        let changed = levels.len() != self.levels.len()
            || levels
                .iter()
                .zip(&self.levels)
                .any(|(a, b)| a.price != b.price || a.touch_count != b.touch_count);
        self.levels = levels;
        changed
    }

    /// Set `is_resistance` on every level from `reference_price`.
    pub fn reclassify(&mut self, reference_price: f64) {
        for level in &mut self.levels {
            level.reclassify(reference_price);
        }
    }

    /// Reclassify, then expose the levels.
    pub fn report(&mut self, reference_price: f64) -> &[KeyLevel] {
        self.reclassify(reference_price);
        &self.levels
    }

    /// Replace the level set, e.g. with a persisted one after a restart.
    pub fn restore(&mut self, levels: Vec<KeyLevel>) {
        self.levels = levels;
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn performance(&self) -> &LevelPerformance {
        &self.performance
    }

    /// Hand over the counters and start a fresh period.
    pub fn take_performance(&mut self) -> LevelPerformance {
        std::mem::take(&mut self.performance)
    }
}

/// Re-score a level whose last touch precedes the window. Kept with the
/// stale penalty while it still meets `min_strength`.
fn age_out(
    level: &KeyLevel,
    bars: &[Bar],
    params: &DetectorParams,
    perf: &mut LevelPerformance,
) -> Option<KeyLevel> {
    let age = bars
        .iter()
        .filter(|b| b.timestamp > level.last_touch)
        .count()
        .max(params.lookback + 1);
    let span = bars
        .iter()
        .filter(|b| b.timestamp > level.first_touch && b.timestamp <= level.last_touch)
        .count();
    let strength = score_strength(
        StrengthInputs {
            touch_count: level.touch_count,
            age,
            span,
            lookback: params.lookback,
        },
        &params.scoring,
    );

    if strength.is_finite() && strength >= params.min_strength {
        debug!(price = level.price, age, strength, "stale level kept");
        perf.stale += 1;
        Some(KeyLevel {
            strength,
            ..level.clone()
        })
    } else {
        debug!(
            price = level.price,
            age,
            strength,
            reason = RejectReason::LowStrength.as_str(),
            "stale level dropped"
        );
        perf.rejected_low_strength += 1;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bars_from_closes;

    /// Zig-zag between 1.0 and 2.0 with a period of `leg * 2` bars.
    fn zigzag(n: usize, leg: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let phase = i % (2 * leg);
                let t = if phase <= leg { phase } else { 2 * leg - phase };
                1.0 + t as f64 / leg as f64
            })
            .collect()
    }

    #[test]
    fn short_history_yields_no_levels() {
        let bars = bars_from_closes(&[1.0, 1.1, 1.0, 0.9], 0.01);
        let params = DetectorParams::new(50, 0.01, 1, 0.0);
        let detection = scan(&bars, &params);
        assert!(detection.levels.is_empty());
        assert!(detection.insufficient_history);
    }

    #[test]
    fn zigzag_yields_support_and_resistance() {
        let bars = bars_from_closes(&zigzag(41, 5), 0.01);
        let params = DetectorParams::new(41, 0.02, 3, 0.5);
        let levels = detect_levels(&bars, &params);
        assert_eq!(levels.len(), 2);
        assert!((levels[0].price - 0.99).abs() < 1e-9);
        assert!(!levels[0].is_resistance);
        assert!((levels[1].price - 2.01).abs() < 1e-9);
        assert!(levels[1].is_resistance);
        assert!(levels.iter().all(|l| l.touch_count >= 3));
    }

    #[test]
    fn min_touches_rejections_are_recorded() {
        let bars = bars_from_closes(&zigzag(41, 5), 0.01);
        let params = DetectorParams::new(41, 0.02, 10, 0.0);
        let detection = scan(&bars, &params);
        assert!(detection.levels.is_empty());
        assert!(detection
            .rejections
            .iter()
            .all(|r| r.reason == RejectReason::LowTouchCount));
        assert_eq!(detection.rejections.len(), 2);
    }

    #[test]
    fn report_reclassifies_first() {
        let bars = bars_from_closes(&zigzag(41, 5), 0.01);
        let mut detector = KeyLevelDetector::new(DetectorParams::new(41, 0.02, 3, 0.5));
        assert!(detector.rescan(&bars));
        assert!(!detector.rescan(&bars));

        let above_all = detector.report(3.0).to_vec();
        assert!(above_all.iter().all(|l| !l.is_resistance));
        let below_all = detector.report(0.5).to_vec();
        assert!(below_all.iter().all(|l| l.is_resistance));
        for (a, b) in above_all.iter().zip(&below_all) {
            assert_eq!(a.strength, b.strength);
        }
        assert_eq!(detector.performance().scans, 2);
        assert_eq!(detector.take_performance().accepted, 4);
        assert_eq!(detector.performance().scans, 0);
    }

    /// The zig-zag, then 60 flat bars far above it.
    fn zigzag_then_flat() -> Vec<Bar> {
        let mut closes = zigzag(41, 5);
        closes.extend(std::iter::repeat(3.0).take(60));
        bars_from_closes(&closes, 0.01)
    }

    #[test]
    fn levels_past_the_window_are_penalized() {
        let bars = zigzag_then_flat();
        let mut detector = KeyLevelDetector::new(DetectorParams::new(41, 0.02, 3, 0.0));
        detector.rescan(&bars[..41]);
        let fresh = detector.report(1.5).to_vec();
        assert_eq!(fresh.len(), 2);

        // The scan alone no longer sees them.
        assert!(scan(&bars, detector.params()).levels.is_empty());

        assert!(!detector.rescan(&bars));
        let stale = detector.report(3.0).to_vec();
        assert_eq!(stale.len(), 2);
        for (old, new) in fresh.iter().zip(&stale) {
            assert_eq!(old.price, new.price);
            assert_eq!(old.last_touch, new.last_touch);
            assert!(new.strength < old.strength);
            assert!(new.strength >= ScoringConfig::default().strength_floor);
        }
        assert_eq!(detector.performance().stale, 2);
    }

    #[test]
    fn stale_levels_below_min_strength_are_dropped() {
        let bars = zigzag_then_flat();
        let mut detector = KeyLevelDetector::new(DetectorParams::new(41, 0.02, 3, 0.5));
        detector.rescan(&bars[..41]);
        assert_eq!(detector.len(), 2);
        let rejected_before = detector.performance().rejected_low_strength;

        assert!(detector.rescan(&bars));
        assert!(detector.is_empty());
        assert_eq!(
            detector.performance().rejected_low_strength,
            rejected_before + 2
        );
    }

    #[test]
    fn resolve_uses_timeframe_defaults() {
        let config = StrategyConfig::default();
        let params = DetectorParams::resolve(&config, Timeframe::H1, &Instrument::forex("EURUSD"));
        assert_eq!(params.lookback, 200);
        assert!((params.touch_zone - 0.0015).abs() < 1e-12);
        assert_eq!(params.movement_multiplier, 2.0);

        let config = StrategyConfig {
            lookback_period: Some(80),
            touch_zone: Some(10.0),
            ..StrategyConfig::default()
        };
        let params = DetectorParams::resolve(&config, Timeframe::D1, &Instrument::forex("EURUSD"));
        assert_eq!(params.lookback, 80);
        assert!((params.touch_zone - 0.0010).abs() < 1e-12);
        assert_eq!(params.movement_multiplier, 3.0);
    }
}
