//! Strength scoring.
//!
//! `strength = touch_base(touches) × (1 + recency + duration)`, clamped to
//! `[strength_floor, strength_cap]`. All constants come from [`ScoringConfig`].

use crate::config::ScoringConfig;

/// Inputs of one strength computation, in bars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrengthInputs {
    pub touch_count: usize,
    /// Bars between the last touch and the newest bar.
    pub age: usize,
    /// Bars between the first and last touch.
    pub span: usize,
    pub lookback: usize,
}

/// Base strength of the highest band whose threshold `touch_count` reaches.
pub fn touch_base(touch_count: usize, scoring: &ScoringConfig) -> f64 {
    scoring
        .touch_bands
        .iter()
        .take_while(|band| touch_count >= band.min_touches)
        .last()
        .map_or(0.0, |band| band.base)
}

pub fn recency_modifier(age: usize, lookback: usize, scoring: &ScoringConfig) -> f64 {
    let age = age as f64;
    let lookback = lookback as f64;
    if age <= lookback / 4.0 {
        scoring.recent_quarter_bonus
    } else if age <= lookback / 2.0 {
        scoring.recent_half_bonus
    } else if age <= lookback {
        0.0
    } else {
        scoring.stale_penalty
    }
}

pub fn duration_modifier(span: usize, lookback: usize, scoring: &ScoringConfig) -> f64 {
    let fraction = span as f64 / lookback as f64;
    if fraction >= scoring.long_span_fraction {
        scoring.long_span_bonus
    } else if fraction >= scoring.mid_span_fraction {
        scoring.mid_span_bonus
    } else {
        0.0
    }
}

/// Clamped strength; NaN when the inputs cannot be scored (zero lookback).
pub fn score_strength(inputs: StrengthInputs, scoring: &ScoringConfig) -> f64 {
    if inputs.lookback == 0 {
        return f64::NAN;
    }
    let base = touch_base(inputs.touch_count, scoring);
    let modifier = recency_modifier(inputs.age, inputs.lookback, scoring)
        + duration_modifier(inputs.span, inputs.lookback, scoring);
    (base * (1.0 + modifier)).clamp(scoring.strength_floor, scoring.strength_cap)
}
