//! Strategy configuration: one flat record, validated once at startup.
//!
//! Distances are expressed in pips and converted through the context's
//! [`Instrument`](crate::domain::Instrument). Detection parameters left unset
//! fall back to the [`Timeframe`](crate::domain::Timeframe) defaults table.
//! Strength-scoring constants live in the `[scoring]` table so they can be
//! tuned without touching code.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors. Fatal: raised by `validate()` before any context runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// How the position is scaled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitMode {
    /// Hold the whole size until a full exit fires.
    Full,
    /// One partial close at the trigger ratio.
    Partial,
    /// A partial close at every multiple of the trigger ratio.
    Scaled,
}

/// How the trailing-stop candidate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingMode {
    /// `price ∓ trailing_step` pips.
    Fixed,
    /// `price ∓ atr_multiplier × ATR(atr_period)`.
    Atr,
}

/// One step of the touch-count → base-strength table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchBand {
    pub min_touches: usize,
    pub base: f64,
}

/// Empirical strength-scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Ascending by `min_touches`, non-decreasing in `base`.
    pub touch_bands: Vec<TouchBand>,
    /// Last touch within the most recent quarter of the lookback.
    pub recent_quarter_bonus: f64,
    /// Last touch within the most recent half of the lookback.
    pub recent_half_bonus: f64,
    /// Last touch older than the lookback window.
    pub stale_penalty: f64,
    pub long_span_fraction: f64,
    pub long_span_bonus: f64,
    pub mid_span_fraction: f64,
    pub mid_span_bonus: f64,
    pub strength_floor: f64,
    pub strength_cap: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let bands = [
            (1, 0.35),
            (2, 0.45),
            (3, 0.55),
            (4, 0.65),
            (5, 0.75),
            (7, 0.80),
            (10, 0.85),
        ];
        Self {
            touch_bands: bands
                .iter()
                .map(|&(min_touches, base)| TouchBand { min_touches, base })
                .collect(),
            recent_quarter_bonus: 0.15,
            recent_half_bonus: 0.05,
            stale_penalty: -0.6,
            long_span_fraction: 0.5,
            long_span_bonus: 0.10,
            mid_span_fraction: 0.25,
            mid_span_bonus: 0.05,
            strength_floor: 0.35,
            strength_cap: 0.95,
        }
    }
}

/// The flat strategy record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    // ── Key level detection ──
    /// Bars scanned for levels; `None` → timeframe default.
    pub lookback_period: Option<usize>,
    /// Clustering/touch tolerance in pips; `None` → timeframe default.
    pub touch_zone: Option<f64>,
    pub min_touches: usize,
    pub min_strength: f64,
    /// Required excursion between touches, in touch zones; `None` → timeframe default.
    pub movement_multiplier: Option<f64>,
    pub swing_high_window: usize,
    pub swing_low_window: usize,

    // ── Breakout confirmation ──
    pub min_candles: usize,
    pub volume_threshold: f64,
    pub volume_period: usize,
    pub momentum_threshold: f64,
    pub momentum_period: usize,
    pub pattern_weight: f64,
    pub max_wait_bars: usize,

    // ── Entry ──
    pub lot_size: f64,
    pub stop_loss_pips: f64,
    pub take_profit_pips: f64,

    // ── Exit management ──
    pub exit_mode: ExitMode,
    pub breakeven_points: f64,
    pub breakeven_buffer: f64,
    pub trailing_mode: TrailingMode,
    pub trailing_start: f64,
    pub trailing_step: f64,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub min_stop_improvement: f64,
    /// Fraction of the total size closed per partial exit.
    pub partial_ratio: f64,
    /// Floating profit as a fraction of the take-profit distance that triggers a partial.
    pub partial_trigger_ratio: f64,
    /// Maximum holding bars; 0 disables.
    pub max_bars: usize,
    /// Maximum holding minutes; 0 disables.
    pub time_stop_minutes: u64,

    // ── Runtime ──
    pub max_retries: u32,
    pub performance_period_minutes: u64,

    pub scoring: ScoringConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            lookback_period: None,
            touch_zone: None,
            min_touches: 3,
            min_strength: 0.5,
            movement_multiplier: None,
            swing_high_window: 2,
            swing_low_window: 2,

            min_candles: 3,
            volume_threshold: 1.5,
            volume_period: 20,
            momentum_threshold: 50.0,
            momentum_period: 14,
            pattern_weight: 0.1,
            max_wait_bars: 5,

            lot_size: 0.1,
            stop_loss_pips: 50.0,
            take_profit_pips: 100.0,

            exit_mode: ExitMode::Partial,
            breakeven_points: 15.0,
            breakeven_buffer: 2.0,
            trailing_mode: TrailingMode::Fixed,
            trailing_start: 30.0,
            trailing_step: 20.0,
            atr_period: 14,
            atr_multiplier: 3.0,
            min_stop_improvement: 1.0,
            partial_ratio: 0.5,
            partial_trigger_ratio: 0.5,
            max_bars: 0,
            time_stop_minutes: 0,

            max_retries: 3,
            performance_period_minutes: 60,

            scoring: ScoringConfig::default(),
        }
    }
}

impl StrategyConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: StrategyConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Range checks. Out-of-range values fail initialization, never a running cycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(lookback) = self.lookback_period {
            let min = 2 * self.swing_high_window.max(self.swing_low_window) + 1;
            if lookback < min {
                return Err(ConfigError::invalid(
                    "lookback_period",
                    format!("{lookback} is shorter than one swing pattern ({min} bars)"),
                ));
            }
        }
        if let Some(zone) = self.touch_zone {
            require_positive("touch_zone", zone)?;
        }
        if let Some(multiplier) = self.movement_multiplier {
            require_positive("movement_multiplier", multiplier)?;
        }
        if self.min_touches == 0 {
            return Err(ConfigError::invalid("min_touches", "must be at least 1"));
        }
        require_unit("min_strength", self.min_strength)?;
        if self.swing_high_window == 0 || self.swing_low_window == 0 {
            return Err(ConfigError::invalid(
                "swing_high_window",
                "swing windows must be at least 1 bar",
            ));
        }
        if self.swing_high_window.abs_diff(self.swing_low_window) > 1 {
            return Err(ConfigError::invalid(
                "swing_low_window",
                format!(
                    "swing windows {} (high) and {} (low) differ by more than one bar",
                    self.swing_high_window, self.swing_low_window
                ),
            ));
        }

        if self.min_candles == 0 {
            return Err(ConfigError::invalid("min_candles", "must be at least 1"));
        }
        require_non_negative("volume_threshold", self.volume_threshold)?;
        if self.volume_period == 0 {
            return Err(ConfigError::invalid("volume_period", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.momentum_threshold) {
            return Err(ConfigError::invalid(
                "momentum_threshold",
                format!("{} is outside [0, 100]", self.momentum_threshold),
            ));
        }
        if self.momentum_period == 0 {
            return Err(ConfigError::invalid("momentum_period", "must be at least 1"));
        }
        require_unit("pattern_weight", self.pattern_weight)?;
        if self.max_wait_bars < self.min_candles {
            return Err(ConfigError::invalid(
                "max_wait_bars",
                format!(
                    "{} leaves no room for {} confirming candles",
                    self.max_wait_bars, self.min_candles
                ),
            ));
        }

        require_positive("lot_size", self.lot_size)?;
        require_positive("stop_loss_pips", self.stop_loss_pips)?;
        require_positive("take_profit_pips", self.take_profit_pips)?;

        require_positive("breakeven_points", self.breakeven_points)?;
        require_non_negative("breakeven_buffer", self.breakeven_buffer)?;
        if self.breakeven_buffer >= self.breakeven_points {
            return Err(ConfigError::invalid(
                "breakeven_buffer",
                "must be smaller than breakeven_points",
            ));
        }
        require_non_negative("trailing_start", self.trailing_start)?;
        require_positive("trailing_step", self.trailing_step)?;
        if self.atr_period == 0 {
            return Err(ConfigError::invalid("atr_period", "must be at least 1"));
        }
        require_positive("atr_multiplier", self.atr_multiplier)?;
        require_positive("min_stop_improvement", self.min_stop_improvement)?;
        if self.partial_ratio <= 0.0 || self.partial_ratio >= 1.0 {
            return Err(ConfigError::invalid(
                "partial_ratio",
                format!("{} is outside (0, 1)", self.partial_ratio),
            ));
        }
        require_positive("partial_trigger_ratio", self.partial_trigger_ratio)?;
        if self.performance_period_minutes == 0 {
            return Err(ConfigError::invalid(
                "performance_period_minutes",
                "must be at least 1",
            ));
        }

        self.scoring.validate()
    }

    /// Deterministic BLAKE3 fingerprint of the full configuration, used to
    /// correlate log lines and reports with the parameters that produced them.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let hash = blake3::hash(json.as_bytes());
        hash.to_hex()[..16].to_string()
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.touch_bands.is_empty() {
            return Err(ConfigError::invalid("scoring.touch_bands", "must not be empty"));
        }
        for band in &self.touch_bands {
            require_unit("scoring.touch_bands", band.base)?;
        }
        for pair in self.touch_bands.windows(2) {
            if pair[1].min_touches <= pair[0].min_touches {
                return Err(ConfigError::invalid(
                    "scoring.touch_bands",
                    "bands must be sorted by strictly increasing min_touches",
                ));
            }
            if pair[1].base < pair[0].base {
                return Err(ConfigError::invalid(
                    "scoring.touch_bands",
                    "base strength must be non-decreasing in touch count",
                ));
            }
        }
        require_unit("scoring.strength_floor", self.strength_floor)?;
        require_unit("scoring.strength_cap", self.strength_cap)?;
        if self.strength_floor > self.strength_cap {
            return Err(ConfigError::invalid(
                "scoring.strength_floor",
                "floor must not exceed cap",
            ));
        }
        if self.stale_penalty <= -1.0 {
            return Err(ConfigError::invalid(
                "scoring.stale_penalty",
                "must be greater than -1 to keep strength positive",
            ));
        }
        if self.mid_span_fraction > self.long_span_fraction {
            return Err(ConfigError::invalid(
                "scoring.mid_span_fraction",
                "must not exceed long_span_fraction",
            ));
        }
        Ok(())
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must be positive")))
    }
}

fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} must not be negative")))
    }
}

fn require_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}
