//! Performance counters and the periodic roll-over.
//!
//! Each engine accumulates its own counters. At the start of a cycle that
//! crosses a period boundary the context takes them all, closes the period
//! and keeps the snapshot as `last_period`. Counters never reset mid-cycle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::exit::ExitType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelPerformance {
    pub scans: usize,
    /// Scans skipped for lack of history.
    pub insufficient_history: usize,
    pub accepted: usize,
    pub rejected_low_touch_count: usize,
    pub rejected_low_strength: usize,
    pub merged_into_existing: usize,
    pub not_scorable: usize,
    /// Levels carried past the window with the stale penalty.
    pub stale: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationPerformance {
    pub started: usize,
    /// Breakouts ignored because the level was already awaiting confirmation.
    pub ignored: usize,
    pub confirmed: usize,
    /// False breakouts: price closed back through the level.
    pub invalidated: usize,
    pub timed_out: usize,
    total_bars_to_confirm: usize,
}

impl ConfirmationPerformance {
    pub fn record_confirmed(&mut self, bars_elapsed: usize) {
        self.confirmed += 1;
        self.total_bars_to_confirm += bars_elapsed;
    }

    pub fn avg_bars_to_confirm(&self) -> Option<f64> {
        (self.confirmed > 0).then(|| self.total_bars_to_confirm as f64 / self.confirmed as f64)
    }

    /// Share of resolved breakouts that confirmed.
    pub fn confirmation_rate(&self) -> Option<f64> {
        let resolved = self.confirmed + self.invalidated + self.timed_out;
        (resolved > 0).then(|| self.confirmed as f64 / resolved as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPerformance {
    pub stop_loss: usize,
    pub take_profit: usize,
    pub trailing_stop: usize,
    pub breakeven: usize,
    pub time_stop: usize,
    pub manual: usize,
    pub partial_closes: usize,
    pub stop_modifications: usize,
    pub rejected_stop_updates: usize,
    /// Running mean over closed positions.
    pub avg_holding_minutes: f64,
    /// Worst floating loss seen on any position, in price units.
    pub max_drawdown: f64,
}

impl ExitPerformance {
    pub fn closed(&self) -> usize {
        self.stop_loss
            + self.take_profit
            + self.trailing_stop
            + self.breakeven
            + self.time_stop
            + self.manual
    }

    pub fn record_exit(&mut self, exit_type: ExitType, holding_minutes: f64, drawdown: f64) {
        let counter = match exit_type {
            ExitType::StopLoss => &mut self.stop_loss,
            ExitType::TakeProfit => &mut self.take_profit,
            ExitType::TrailingStop => &mut self.trailing_stop,
            ExitType::Breakeven => &mut self.breakeven,
            ExitType::TimeStop => &mut self.time_stop,
            ExitType::Manual => &mut self.manual,
        };
        *counter += 1;
        let n = self.closed() as f64;
        self.avg_holding_minutes += (holding_minutes - self.avg_holding_minutes) / n;
        self.max_drawdown = self.max_drawdown.max(drawdown);
    }
}

/// Counters of one closed period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub levels: LevelPerformance,
    pub confirmations: ConfirmationPerformance,
    pub exits: ExitPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceBook {
    period_minutes: u64,
    period_start: Option<DateTime<Utc>>,
    last_period: Option<PeriodReport>,
}

impl PerformanceBook {
    pub fn new(period_minutes: u64) -> Self {
        Self {
            period_minutes: period_minutes.max(1),
            period_start: None,
            last_period: None,
        }
    }

    fn period(&self) -> Duration {
        Duration::minutes(self.period_minutes as i64)
    }

    /// Start of the period containing `now`, aligned to the epoch.
    fn align(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.period_minutes as i64 * 60;
        let ts = now.timestamp();
        DateTime::from_timestamp(ts - ts.rem_euclid(secs), 0).unwrap_or(now)
    }

    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.period_start
    }

    pub fn last_period(&self) -> Option<&PeriodReport> {
        self.last_period.as_ref()
    }

    /// True when `now` lies past the end of the open period. The first call
    /// opens a period and returns false.
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> bool {
        match self.period_start {
            None => {
                self.period_start = Some(self.align(now));
                false
            }
            Some(start) => now >= start + self.period(),
        }
    }

    /// Close the open period with the given counters and open the one
    /// containing `now`.
    pub fn roll(
        &mut self,
        now: DateTime<Utc>,
        levels: LevelPerformance,
        confirmations: ConfirmationPerformance,
        exits: ExitPerformance,
    ) -> &PeriodReport {
        let start = self.period_start.unwrap_or_else(|| self.align(now));
        let report = PeriodReport {
            start,
            end: start + self.period(),
            levels,
            confirmations,
            exits,
        };
        info!(
            period_start = %report.start,
            accepted_levels = report.levels.accepted,
            confirmed = report.confirmations.confirmed,
            false_breakouts = report.confirmations.invalidated,
            timed_out = report.confirmations.timed_out,
            exits = report.exits.closed(),
            avg_holding_minutes = report.exits.avg_holding_minutes,
            max_drawdown = report.exits.max_drawdown,
            "performance period closed"
        );
        self.period_start = Some(self.align(now));
        self.last_period.insert(report)
    }
}
