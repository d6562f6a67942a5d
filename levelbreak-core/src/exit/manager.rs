//! The exit manager: evolves the stop and the partial-exit schedule of the
//! open position each cycle and decides which exit fires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ratchet::{StopRatchet, StopUpdate};
use super::state::{ExitState, ExitType, Lifecycle, StopSource};
use crate::config::{ExitMode, StrategyConfig, TrailingMode};
use crate::domain::{Instrument, Side};
use crate::execution::TradeIntent;
use crate::performance::ExitPerformance;

/// Exit rules with every distance converted to price units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitParams {
    pub exit_mode: ExitMode,
    pub breakeven_points: f64,
    pub breakeven_buffer: f64,
    pub trailing_mode: TrailingMode,
    pub trailing_start: f64,
    pub trailing_step: f64,
    pub atr_multiplier: f64,
    pub min_stop_improvement: f64,
    pub partial_ratio: f64,
    pub partial_trigger_ratio: f64,
    pub max_bars: usize,
    pub time_stop_minutes: u64,
    pub tick_size: f64,
    pub lot_step: f64,
    pub min_lot: f64,
}

impl ExitParams {
    pub fn from_config(config: &StrategyConfig, instrument: &Instrument) -> Self {
        Self {
            exit_mode: config.exit_mode,
            breakeven_points: instrument.pips(config.breakeven_points),
            breakeven_buffer: instrument.pips(config.breakeven_buffer),
            trailing_mode: config.trailing_mode,
            trailing_start: instrument.pips(config.trailing_start),
            trailing_step: instrument.pips(config.trailing_step),
            atr_multiplier: config.atr_multiplier,
            min_stop_improvement: instrument
                .pips(config.min_stop_improvement)
                .max(instrument.tick_size),
            partial_ratio: config.partial_ratio,
            partial_trigger_ratio: config.partial_trigger_ratio,
            max_bars: config.max_bars,
            time_stop_minutes: config.time_stop_minutes,
            tick_size: instrument.tick_size,
            lot_step: instrument.lot_step,
            min_lot: instrument.min_lot,
        }
    }

    fn round_price(&self, price: f64) -> f64 {
        if self.tick_size > 0.0 {
            (price / self.tick_size).round() * self.tick_size
        } else {
            price
        }
    }

    fn round_lots(&self, lots: f64) -> f64 {
        ((lots / self.lot_step) + 1e-9).floor() * self.lot_step
    }
}

/// What the context observed this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitObservation {
    pub price: f64,
    pub time: DateTime<Utc>,
    /// Stop currently held by the broker.
    pub observed_stop: Option<f64>,
    /// Open volume currently held by the broker.
    pub observed_volume: Option<f64>,
    /// Latest ATR, required in ATR trailing mode.
    pub atr: Option<f64>,
    /// A new bar closed since the previous cycle.
    pub new_bar: bool,
}

impl ExitObservation {
    pub fn at(price: f64, time: DateTime<Utc>) -> Self {
        Self {
            price,
            time,
            observed_stop: None,
            observed_volume: None,
            atr: None,
            new_bar: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExitManager {
    params: ExitParams,
    state: Option<ExitState>,
    performance: ExitPerformance,
}

impl ExitManager {
    pub fn new(params: ExitParams) -> Self {
        Self {
            params,
            state: None,
            performance: ExitPerformance::default(),
        }
    }

    pub fn params(&self) -> &ExitParams {
        &self.params
    }

    pub fn state(&self) -> Option<&ExitState> {
        self.state.as_ref()
    }

    /// True while a position is under management.
    pub fn is_managing(&self) -> bool {
        self.state.as_ref().is_some_and(ExitState::is_open)
    }

    /// Start managing a freshly opened position.
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        &mut self,
        ticket: u64,
        side: Side,
        entry_price: f64,
        stop: f64,
        take_profit: f64,
        lots: f64,
        opened_at: DateTime<Utc>,
    ) -> &ExitState {
        let breakeven_level = self
            .params
            .round_price(side.ahead(entry_price, self.params.breakeven_buffer));
        info!(
            ticket,
            side = %side,
            entry = entry_price,
            stop,
            take_profit,
            lots,
            "exit management started"
        );
        self.state.insert(ExitState {
            ticket,
            side,
            entry_price,
            initial_stop: stop,
            current_stop: stop,
            stop_source: StopSource::Initial,
            take_profit,
            breakeven_level,
            trailing_stop: None,
            max_floating_profit: 0.0,
            max_floating_loss: 0.0,
            exit_mode: self.params.exit_mode,
            total_lots: lots,
            remaining_lots: lots,
            lifecycle: Lifecycle::Active,
            breakeven_set: false,
            trailing_active: false,
            partials_taken: 0,
            pending_partial: None,
            opened_at,
            bars_held: 0,
            time_stop_armed: false,
            manual_exit_requested: false,
        })
    }

    /// Restore a persisted state after a restart. Flags are re-derived on the
    /// next update.
    pub fn restore(&mut self, state: ExitState) {
        self.state = Some(state);
    }

    /// Run one cycle: sync, breakeven, trailing, time stop, partial profit.
    ///
    /// Emits at most one `ModifyStop` (the final stop of the cycle), placed
    /// before any partial close.
    pub fn update(&mut self, obs: &ExitObservation) -> Vec<TradeIntent> {
        let Self {
            params,
            state,
            performance,
        } = self;
        let Some(state) = state.as_mut().filter(|s| s.is_open()) else {
            return Vec::new();
        };
        let mut intents = Vec::new();

        sync_observed(params, state, obs);
        if obs.new_bar {
            state.bars_held += 1;
        }
        let profit = state.floating_profit(obs.price);
        state.max_floating_profit = state.max_floating_profit.max(profit);
        state.max_floating_loss = state.max_floating_loss.max(-profit);

        let ratchet = StopRatchet::new(state.side, params.min_stop_improvement);
        let cycle_start_stop = state.current_stop;

        // Breakeven, derived from the stop itself rather than a cached flag.
        let at_breakeven =
            state.side.profit(state.breakeven_level, state.current_stop) >= -params.tick_size / 2.0;
        if at_breakeven {
            if !state.breakeven_set {
                debug!(ticket = state.ticket, stop = state.current_stop, "stop already at breakeven");
            }
            state.breakeven_set = true;
        } else {
            state.breakeven_set = false;
            if profit >= params.breakeven_points {
                let proposed = state.breakeven_level;
                let update = ratchet.apply(&mut state.current_stop, proposed);
                if record(performance, state.ticket, update, "breakeven") {
                    state.stop_source = StopSource::Breakeven;
                    state.breakeven_set = true;
                }
            }
        }

        // Trailing.
        if profit > params.trailing_start {
            let distance = match params.trailing_mode {
                TrailingMode::Fixed => Some(params.trailing_step),
                TrailingMode::Atr => obs.atr.map(|atr| atr * params.atr_multiplier),
            };
            match distance {
                Some(distance) if distance.is_finite() && distance > 0.0 => {
                    state.trailing_active = true;
                    let proposed = params.round_price(state.side.behind(obs.price, distance));
                    let update = ratchet.apply(&mut state.current_stop, proposed);
                    if record(performance, state.ticket, update, "trailing") {
                        state.stop_source = StopSource::Trailing;
                        state.trailing_stop = Some(proposed);
                    }
                }
                _ => debug!(ticket = state.ticket, "no ATR reading, trailing skipped"),
            }
        }

        // Time stop.
        let bars_exceeded = params.max_bars > 0 && state.bars_held > params.max_bars;
        let minutes_exceeded = params.time_stop_minutes > 0
            && state.minutes_held(obs.time) > params.time_stop_minutes as f64;
        if (bars_exceeded || minutes_exceeded) && !state.time_stop_armed {
            info!(
                ticket = state.ticket,
                bars_held = state.bars_held,
                minutes_held = state.minutes_held(obs.time),
                "time stop armed"
            );
            state.time_stop_armed = true;
        }

        // Partial profit. Committed once the gateway fills it.
        if state.pending_partial.is_none() {
            if let Some((fraction, lots)) = partial_close(params, state, profit) {
                state.pending_partial = Some(lots);
                intents.push(TradeIntent::ClosePosition {
                    ticket: state.ticket,
                    volume_fraction: fraction,
                });
            }
        }

        if state.current_stop != cycle_start_stop {
            performance.stop_modifications += 1;
            intents.insert(
                0,
                TradeIntent::ModifyStop {
                    ticket: state.ticket,
                    new_stop: state.current_stop,
                },
            );
        }

        intents
    }

    /// The exit that fires at `price`, if any, by priority
    /// `Manual > stop > TakeProfit > TimeStop`.
    pub fn check_exit_conditions(&self, price: f64) -> Option<ExitType> {
        let state = self.state.as_ref().filter(|s| s.is_open())?;
        if state.manual_exit_requested {
            return Some(ExitType::Manual);
        }
        if state.side.profit(state.current_stop, price) <= 0.0 {
            return Some(state.stop_exit_type());
        }
        if state.side.profit(state.take_profit, price) >= 0.0 {
            return Some(ExitType::TakeProfit);
        }
        state.time_stop_armed.then_some(ExitType::TimeStop)
    }

    /// Full close of the remaining position, without committing the exit.
    pub fn close_intent(&self) -> Option<TradeIntent> {
        let state = self.state.as_ref().filter(|s| s.is_open())?;
        Some(TradeIntent::ClosePosition {
            ticket: state.ticket,
            volume_fraction: 1.0,
        })
    }

    /// Commit the pending partial close after the gateway filled it.
    pub fn confirm_partial(&mut self, remaining_volume: f64) -> bool {
        let Some(state) = self.state.as_mut().filter(|s| s.is_open()) else {
            return false;
        };
        let Some(lots) = state.pending_partial.take() else {
            return false;
        };
        state.remaining_lots = remaining_volume;
        state.partials_taken += 1;
        state.lifecycle = Lifecycle::PartiallyClosed;
        self.performance.partial_closes += 1;
        info!(
            ticket = state.ticket,
            lots,
            remaining = remaining_volume,
            "partial close filled"
        );
        true
    }

    /// Drop the pending partial close; the next update re-evaluates it.
    pub fn abandon_partial(&mut self) {
        if let Some(state) = self.state.as_mut().filter(|s| s.is_open()) {
            if let Some(lots) = state.pending_partial.take() {
                warn!(ticket = state.ticket, lots, "partial close not filled");
            }
        }
    }

    /// Close the whole remaining position and record the exit.
    pub fn execute_exit(&mut self, exit_type: ExitType, time: DateTime<Utc>) -> Option<TradeIntent> {
        let state = self.state.as_mut().filter(|s| s.is_open())?;
        state.lifecycle = Lifecycle::Closed;
        let minutes = state.minutes_held(time);
        self.performance
            .record_exit(exit_type, minutes, state.max_floating_loss);
        info!(
            ticket = state.ticket,
            exit = %exit_type,
            stop = state.current_stop,
            minutes_held = minutes,
            max_floating_profit = state.max_floating_profit,
            max_floating_loss = state.max_floating_loss,
            "position exit"
        );
        Some(TradeIntent::ClosePosition {
            ticket: state.ticket,
            volume_fraction: 1.0,
        })
    }

    /// Arm a manual exit; it fires on the next exit check.
    pub fn request_manual_exit(&mut self) -> bool {
        match self.state.as_mut().filter(|s| s.is_open()) {
            Some(state) => {
                state.manual_exit_requested = true;
                true
            }
            None => false,
        }
    }

    pub fn performance(&self) -> &ExitPerformance {
        &self.performance
    }

    pub fn take_performance(&mut self) -> ExitPerformance {
        std::mem::take(&mut self.performance)
    }
}

/// Adopt the broker's stop and volume when they disagree with the cache.
fn sync_observed(params: &ExitParams, state: &mut ExitState, obs: &ExitObservation) {
    if let Some(observed) = obs.observed_stop {
        if (observed - state.current_stop).abs() > params.tick_size / 2.0 {
            warn!(
                ticket = state.ticket,
                cached = state.current_stop,
                observed,
                "stale stop, adopting broker state"
            );
            state.current_stop = observed;
            state.stop_source = StopSource::External;
        }
    }
    if let Some(volume) = obs.observed_volume {
        if (volume - state.remaining_lots).abs() > params.lot_step / 2.0 {
            warn!(
                ticket = state.ticket,
                cached = state.remaining_lots,
                observed = volume,
                "stale volume, adopting broker state"
            );
            state.remaining_lots = volume;
            if volume < state.total_lots && state.lifecycle == Lifecycle::Active {
                state.lifecycle = Lifecycle::PartiallyClosed;
            }
        }
    }
}

/// Log and count a ratchet decision; true when the stop moved.
fn record(perf: &mut ExitPerformance, ticket: u64, update: StopUpdate, reason: &str) -> bool {
    match update {
        StopUpdate::Tightened { from, to } => {
            info!(ticket, from, to, reason, "stop tightened");
            true
        }
        StopUpdate::Widening { current, proposed } => {
            perf.rejected_stop_updates += 1;
            warn!(
                ticket,
                current,
                proposed,
                reason,
                "stop update rejected, would widen risk"
            );
            false
        }
        StopUpdate::BelowMinimum { current, proposed } => {
            debug!(
                ticket,
                current,
                proposed,
                reason,
                "stop update below minimum improvement"
            );
            false
        }
    }
}

/// Volume fraction of the remaining position to close now and its lots, if a
/// partial is due.
fn partial_close(params: &ExitParams, state: &ExitState, profit: f64) -> Option<(f64, f64)> {
    let allowed = match state.exit_mode {
        ExitMode::Full => false,
        ExitMode::Partial => state.partials_taken == 0,
        ExitMode::Scaled => true,
    };
    let target_distance = (state.take_profit - state.entry_price).abs();
    if !allowed || target_distance <= 0.0 {
        return None;
    }
    let trigger = params.partial_trigger_ratio * f64::from(state.partials_taken + 1);
    if profit / target_distance < trigger {
        return None;
    }

    let lots = params
        .round_lots(state.total_lots * params.partial_ratio)
        .min(state.remaining_lots);
    let remainder = state.remaining_lots - lots;
    if lots < params.lot_step - 1e-9 || remainder < params.min_lot - 1e-9 {
        debug!(
            ticket = state.ticket,
            lots,
            remaining = state.remaining_lots,
            "partial close skipped, size below lot limits"
        );
        return None;
    }

    info!(
        ticket = state.ticket,
        lots,
        remaining = remainder,
        profit_ratio = profit / target_distance,
        "partial close due"
    );
    Some((lots / state.remaining_lots, lots))
}
