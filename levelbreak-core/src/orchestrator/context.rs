//! One `(symbol, timeframe)` pipeline: detection, confirmation and exit
//! management driven once per update, to completion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use super::ContextKey;
use crate::config::{StrategyConfig, TrailingMode};
use crate::confirmation::{
    detect_crossing, BeginOutcome, BreakoutConfirmationEngine, ConfirmationOutcome,
    ConfirmationParams, ConfirmationState, Resolution,
};
use crate::data::MarketDataProvider;
use crate::domain::{Bar, Instrument, Quote, Side};
use crate::error::CoreError;
use crate::events::PipelineEvent;
use crate::execution::{
    ExecutionError, ExecutionReport, OrderGateway, RetryQueue, Submitted, TradeIntent,
};
use crate::exit::{ExitManager, ExitObservation, ExitParams, ExitState, ExitType};
use crate::indicators::{Atr, Indicator};
use crate::levels::{DetectorParams, KeyLevel, KeyLevelDetector};
use crate::notify::{deliver, NotificationSink};
use crate::performance::{
    ConfirmationPerformance, ExitPerformance, LevelPerformance, PerformanceBook, PeriodReport,
};

/// Outcome of one update cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub key: ContextKey,
    pub time: DateTime<Utc>,
    pub reference_price: f64,
    pub new_bar: bool,
    /// Reclassified against `reference_price`.
    pub levels: Vec<KeyLevel>,
    /// Decisions and gateway-accepted order events, in the order they happened.
    pub events: Vec<PipelineEvent>,
    /// Intents the gateway accepted this cycle, including retried ones.
    pub intents: Vec<TradeIntent>,
    /// Recoverable errors; the cycle still ran to completion.
    pub errors: Vec<CoreError>,
    pub period_closed: Option<PeriodReport>,
}

/// Snapshot of a context for external readers.
#[derive(Debug, Clone, Serialize)]
pub struct ContextReport {
    pub key: ContextKey,
    pub fingerprint: String,
    pub reference_price: Option<f64>,
    pub levels: Vec<KeyLevel>,
    pub awaiting: Vec<ConfirmationState>,
    pub exit: Option<ExitState>,
    pub level_performance: LevelPerformance,
    pub confirmation_performance: ConfirmationPerformance,
    pub exit_performance: ExitPerformance,
    pub last_period: Option<PeriodReport>,
}

/// An open order waiting in the retry queue.
#[derive(Debug, Clone, Copy)]
struct PendingEntry {
    side: Side,
    lots: f64,
    stop: f64,
    target: f64,
}

enum Submission {
    Filled(ExecutionReport),
    Queued,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StrategyContext {
    key: ContextKey,
    instrument: Instrument,
    config: StrategyConfig,
    fingerprint: String,
    detector: KeyLevelDetector,
    confirmations: BreakoutConfirmationEngine,
    exits: ExitManager,
    atr: Atr,
    retry: RetryQueue,
    book: PerformanceBook,
    last_bar_time: Option<DateTime<Utc>>,
    reference_price: Option<f64>,
    ticket: Option<u64>,
    pending_entry: Option<PendingEntry>,
    /// Full close queued for retry, with the exit it records once filled.
    pending_close: Option<ExitType>,
}

impl StrategyContext {
    /// Validate `config` and build the engines for `key`.
    pub fn new(
        key: ContextKey,
        instrument: Instrument,
        config: StrategyConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let detector_params = DetectorParams::resolve(&config, key.timeframe, &instrument);
        let confirmation_params =
            ConfirmationParams::from_config(&config, detector_params.touch_zone);
        let exit_params = ExitParams::from_config(&config, &instrument);
        let fingerprint = config.fingerprint();
        info!(
            context = %key,
            fingerprint = %fingerprint,
            lookback = detector_params.lookback,
            touch_zone = detector_params.touch_zone,
            "strategy context created"
        );

        Ok(Self {
            atr: Atr::new(config.atr_period),
            retry: RetryQueue::new(config.max_retries),
            book: PerformanceBook::new(config.performance_period_minutes),
            detector: KeyLevelDetector::new(detector_params),
            confirmations: BreakoutConfirmationEngine::new(confirmation_params),
            exits: ExitManager::new(exit_params),
            key,
            instrument,
            config,
            fingerprint,
            last_bar_time: None,
            reference_price: None,
            ticket: None,
            pending_entry: None,
            pending_close: None,
        })
    }

    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn detector(&self) -> &KeyLevelDetector {
        &self.detector
    }

    pub fn confirmations(&self) -> &BreakoutConfirmationEngine {
        &self.confirmations
    }

    pub fn exits(&self) -> &ExitManager {
        &self.exits
    }

    /// Ticket of the managed position.
    pub fn ticket(&self) -> Option<u64> {
        self.ticket
    }

    pub fn pending_retries(&self) -> usize {
        self.retry.len()
    }

    pub fn performance_book(&self) -> &PerformanceBook {
        &self.book
    }

    /// Arm a manual exit of the managed position for the next cycle.
    pub fn request_manual_exit(&mut self) -> bool {
        self.exits.request_manual_exit()
    }

    /// Bars requested per cycle.
    pub fn fetch_count(&self) -> usize {
        let p = self.detector.params();
        p.lookback
            .max(self.config.momentum_period + 1)
            .max(self.config.atr_period + 1)
            + self.config.volume_period
            + 1
    }

    /// Reclassify the levels against `reference_price`.
    pub fn reclassify(&mut self, reference_price: f64) {
        self.reference_price = Some(reference_price);
        self.detector.reclassify(reference_price);
    }

    /// Snapshot for readers, reclassified against the latest reference price.
    pub fn report(&mut self) -> ContextReport {
        let levels = match self.reference_price {
            Some(price) => self.detector.report(price).to_vec(),
            None => Vec::new(),
        };
        ContextReport {
            key: self.key.clone(),
            fingerprint: self.fingerprint.clone(),
            reference_price: self.reference_price,
            levels,
            awaiting: self.confirmations.awaiting().to_vec(),
            exit: self.exits.state().cloned(),
            level_performance: self.detector.performance().clone(),
            confirmation_performance: self.confirmations.performance().clone(),
            exit_performance: self.exits.performance().clone(),
            last_period: self.book.last_period().cloned(),
        }
    }

    /// Run one cycle: roll counters, rescan and reclassify levels, retry
    /// pending intents, advance breakouts, act on a confirmation, then manage
    /// the open position.
    pub fn update(
        &mut self,
        market: &dyn MarketDataProvider,
        gateway: &mut dyn OrderGateway,
        notifier: &dyn NotificationSink,
    ) -> Result<CycleReport, CoreError> {
        let _span = info_span!("cycle", context = %self.key).entered();

        let mut bars = market.bars(&self.key.symbol, self.key.timeframe, self.fetch_count())?;
        bars.reverse();
        let quote = market.quote(&self.key.symbol)?;
        let now = quote.timestamp;

        let mut report = CycleReport {
            key: self.key.clone(),
            time: now,
            reference_price: quote.mid(),
            new_bar: false,
            levels: Vec::new(),
            events: Vec::new(),
            intents: Vec::new(),
            errors: Vec::new(),
            period_closed: None,
        };

        if self.book.begin_cycle(now) {
            let closed = self.book.roll(
                now,
                self.detector.take_performance(),
                self.confirmations.take_performance(),
                self.exits.take_performance(),
            );
            report.period_closed = Some(closed.clone());
        }

        let last_time = bars.last().map(|b| b.timestamp);
        report.new_bar = last_time.is_some() && last_time != self.last_bar_time;
        let mut levels_changed = false;
        if report.new_bar {
            self.last_bar_time = last_time;
            levels_changed = self.detector.rescan(&bars);
            let params = self.detector.params();
            let available = bars.len().min(params.lookback);
            if available < params.min_bars() {
                report.errors.push(CoreError::InsufficientData {
                    symbol: self.key.symbol.clone(),
                    timeframe: self.key.timeframe,
                    available,
                    required: params.min_bars(),
                });
            }
        }

        self.reference_price = Some(quote.mid());
        report.levels = self.detector.report(quote.mid()).to_vec();
        if levels_changed {
            report.events.push(PipelineEvent::LevelsChanged {
                levels: report.levels.clone(),
            });
        }

        self.retry_pending(gateway, now, notifier, &mut report);

        let had_position = self.exits.is_managing();
        if report.new_bar && bars.len() >= 2 {
            if let Some(confirmed) = self.advance_confirmations(&bars, notifier, &mut report) {
                if had_position || self.pending_entry.is_some() {
                    debug!(
                        level = confirmed.level.price,
                        "confirmed breakout ignored, position already open"
                    );
                } else {
                    self.open_position(&confirmed, &quote, now, gateway, notifier, &mut report);
                }
            }
        }

        if had_position {
            self.manage_exit(&bars, &quote, now, report.new_bar, gateway, notifier, &mut report);
        }

        debug!(
            new_bar = report.new_bar,
            levels = report.levels.len(),
            awaiting = self.confirmations.awaiting().len(),
            intents = report.intents.len(),
            errors = report.errors.len(),
            "cycle complete"
        );
        Ok(report)
    }

    /// Update awaiting breakouts, then start new ones on fresh crossings.
    /// Returns the first confirmed breakout of the bar.
    fn advance_confirmations(
        &mut self,
        bars: &[Bar],
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) -> Option<ConfirmationState> {
        let mut resolutions = self.confirmations.update_confirmation_state(bars);

        let (prev, bar) = (&bars[bars.len() - 2], &bars[bars.len() - 1]);
        for level in &report.levels {
            let Some(breakout_type) = detect_crossing(prev, bar, level.price) else {
                continue;
            };
            match self
                .confirmations
                .begin_confirmation(level, breakout_type, bars)
            {
                BeginOutcome::Ignored => continue,
                BeginOutcome::Awaiting => {}
                BeginOutcome::Resolved(resolution) => resolutions.push(resolution),
            }
            report.events.push(PipelineEvent::BreakoutStarted {
                level: level.price,
                breakout_type,
                price: bar.close,
            });
        }

        let mut confirmed = None;
        for Resolution { state, outcome } in resolutions {
            report.events.push(PipelineEvent::BreakoutResolved {
                level: state.level.price,
                breakout_type: state.breakout_type,
                outcome,
                score: state.score,
            });
            if outcome == ConfirmationOutcome::Confirmed {
                deliver(
                    notifier,
                    &format!(
                        "{} {} breakout of {:.5} confirmed after {} bars (volume ×{:.2}, momentum {:.1}, score {:.2})",
                        self.key,
                        state.breakout_type,
                        state.level.price,
                        state.bars_elapsed,
                        state.volume_ratio,
                        state.momentum_value,
                        state.score
                    ),
                );
                confirmed.get_or_insert(state);
            }
        }
        confirmed
    }

    fn open_position(
        &mut self,
        confirmed: &ConfirmationState,
        quote: &Quote,
        now: DateTime<Utc>,
        gateway: &mut dyn OrderGateway,
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) {
        let side = confirmed.breakout_type.side();
        let entry = match side {
            Side::Long => quote.ask,
            Side::Short => quote.bid,
        };
        let inst = &self.instrument;
        let plan = PendingEntry {
            side,
            lots: inst.round_lots(self.config.lot_size).max(inst.min_lot),
            stop: inst.round_price(side.behind(entry, inst.pips(self.config.stop_loss_pips))),
            target: inst.round_price(side.ahead(entry, inst.pips(self.config.take_profit_pips))),
        };
        let intent = TradeIntent::OpenPosition {
            side,
            size: plan.lots,
            stop: plan.stop,
            target: plan.target,
        };

        match self.submit(gateway, intent, report) {
            Submission::Filled(fill) => self.start_managing(plan, &fill, now, notifier, report),
            Submission::Queued => self.pending_entry = Some(plan),
            Submission::Failed => {}
        }
    }

    fn start_managing(
        &mut self,
        plan: PendingEntry,
        fill: &ExecutionReport,
        now: DateTime<Utc>,
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) {
        self.exits
            .begin(fill.ticket, plan.side, fill.price, plan.stop, plan.target, plan.lots, now);
        self.ticket = Some(fill.ticket);
        report.events.push(PipelineEvent::PositionOpened {
            ticket: fill.ticket,
            side: plan.side,
            entry: fill.price,
            stop: plan.stop,
            target: plan.target,
            lots: plan.lots,
        });
        deliver(
            notifier,
            &format!(
                "{} opened {} #{} {} lots at {:.5} (stop {:.5}, target {:.5})",
                self.key, plan.side, fill.ticket, plan.lots, fill.price, plan.stop, plan.target
            ),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn manage_exit(
        &mut self,
        bars: &[Bar],
        quote: &Quote,
        now: DateTime<Utc>,
        new_bar: bool,
        gateway: &mut dyn OrderGateway,
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) {
        let (Some(ticket), Some(side)) = (self.ticket, self.exits.state().map(|s| s.side)) else {
            return;
        };
        let price = match side {
            Side::Long => quote.bid,
            Side::Short => quote.ask,
        };

        let Some(snapshot) = gateway.position(ticket) else {
            let bar = bars.last().filter(|_| new_bar);
            let exit_type = self.implied_exit(side, price, bar);
            warn!(ticket, exit = %exit_type, "position closed outside the pipeline");
            report.errors.push(CoreError::StaleState {
                ticket,
                detail: "position closed outside the pipeline".to_string(),
            });
            self.complete_exit(ticket, exit_type, price, now, notifier, report);
            return;
        };

        if self.pending_close.is_some() {
            debug!(ticket, "full close queued for retry, position left as is");
            return;
        }

        if let Some(cached) = self.exits.state().map(|s| s.current_stop) {
            if (snapshot.stop - cached).abs() > self.instrument.tick_size / 2.0 {
                report.errors.push(CoreError::StaleState {
                    ticket,
                    detail: format!("broker stop {:.5} differs from cached {cached:.5}", snapshot.stop),
                });
            }
        }

        let atr = match self.config.trailing_mode {
            TrailingMode::Atr => self.atr.latest(bars),
            TrailingMode::Fixed => None,
        };
        let observation = ExitObservation {
            price,
            time: now,
            observed_stop: Some(snapshot.stop),
            observed_volume: Some(snapshot.volume),
            atr,
            new_bar,
        };

        for intent in self.exits.update(&observation) {
            let partial = matches!(intent, TradeIntent::ClosePosition { .. });
            match self.submit(gateway, intent.clone(), report) {
                Submission::Filled(fill) => self.on_exit_fill(&intent, &fill, report),
                Submission::Queued => {}
                Submission::Failed if partial => self.exits.abandon_partial(),
                Submission::Failed => {}
            }
        }

        let Some(exit_type) = self.exits.check_exit_conditions(price) else {
            return;
        };
        let Some(intent) = self.exits.close_intent() else {
            return;
        };
        match self.submit(gateway, intent, report) {
            Submission::Filled(fill) => {
                self.complete_exit(ticket, exit_type, fill.price, now, notifier, report)
            }
            Submission::Queued => {
                // The queued full close supersedes a queued partial.
                self.exits.abandon_partial();
                self.pending_close = Some(exit_type);
            }
            Submission::Failed => {
                warn!(ticket, exit = %exit_type, "close refused, position stays under management");
            }
        }
    }

    /// Exit implied by the last price or, on a fresh bar, by its range.
    fn implied_exit(&self, side: Side, price: f64, bar: Option<&Bar>) -> ExitType {
        let extremes = bar.map(|bar| match side {
            Side::Long => [bar.low, bar.high],
            Side::Short => [bar.high, bar.low],
        });
        extremes
            .into_iter()
            .flatten()
            .chain(std::iter::once(price))
            .find_map(|p| self.exits.check_exit_conditions(p))
            .unwrap_or(ExitType::Manual)
    }

    /// Record a filled stop modification or partial close.
    fn on_exit_fill(&mut self, intent: &TradeIntent, fill: &ExecutionReport, report: &mut CycleReport) {
        let event = match *intent {
            TradeIntent::ModifyStop { ticket, new_stop } => PipelineEvent::StopModified {
                ticket,
                stop: new_stop,
            },
            TradeIntent::ClosePosition {
                ticket,
                volume_fraction,
            } => {
                self.exits.confirm_partial(fill.remaining_volume);
                PipelineEvent::PartialClose {
                    ticket,
                    volume_fraction,
                    price: fill.price,
                }
            }
            TradeIntent::OpenPosition { .. } => return,
        };
        report.events.push(event);
    }

    /// The gateway filled the full close: commit the exit.
    fn complete_exit(
        &mut self,
        ticket: u64,
        exit_type: ExitType,
        price: f64,
        now: DateTime<Utc>,
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) {
        self.retry.forget_ticket(ticket);
        self.pending_close = None;
        self.exits.execute_exit(exit_type, now);
        self.finish_position(ticket, exit_type, price, notifier, report);
    }

    fn finish_position(
        &mut self,
        ticket: u64,
        exit_type: ExitType,
        price: f64,
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) {
        self.ticket = None;
        report.events.push(PipelineEvent::PositionClosed {
            ticket,
            exit_type,
            price,
        });
        deliver(
            notifier,
            &format!("{} closed #{ticket} at {price:.5} ({exit_type})", self.key),
        );
    }

    fn retry_pending(
        &mut self,
        gateway: &mut dyn OrderGateway,
        now: DateTime<Utc>,
        notifier: &dyn NotificationSink,
        report: &mut CycleReport,
    ) {
        if self.retry.is_empty() {
            return;
        }
        let outcome = self.retry.retry(gateway);
        for (intent, fill) in outcome.succeeded {
            match intent {
                TradeIntent::OpenPosition { .. } => {
                    if let Some(plan) = self.pending_entry.take() {
                        self.start_managing(plan, &fill, now, notifier, report);
                    }
                }
                TradeIntent::ClosePosition {
                    ticket,
                    volume_fraction,
                } if volume_fraction >= 1.0 => {
                    if let Some(exit_type) = self.pending_close {
                        self.complete_exit(ticket, exit_type, fill.price, now, notifier, report);
                    }
                }
                _ => self.on_exit_fill(&intent, &fill, report),
            }
            report.intents.push(intent);
        }
        for pending in outcome.retrying {
            report.errors.push(transient(pending.attempts, pending.last_error));
        }
        for pending in outcome.abandoned {
            match pending.intent {
                TradeIntent::OpenPosition { .. } => self.pending_entry = None,
                TradeIntent::ClosePosition {
                    volume_fraction, ..
                } if volume_fraction >= 1.0 => {
                    // Still open at the broker: the exit is re-evaluated.
                    self.pending_close = None;
                }
                TradeIntent::ClosePosition { .. } => self.exits.abandon_partial(),
                TradeIntent::ModifyStop { .. } => {}
            }
            report.errors.push(transient(pending.attempts, pending.last_error));
        }
    }

    fn submit(
        &mut self,
        gateway: &mut dyn OrderGateway,
        intent: TradeIntent,
        report: &mut CycleReport,
    ) -> Submission {
        match self.retry.submit(gateway, intent.clone()) {
            Ok(Submitted::Filled(fill)) => {
                report.intents.push(intent);
                Submission::Filled(fill)
            }
            Ok(Submitted::Queued(err)) => {
                report.errors.push(transient(1, err));
                Submission::Queued
            }
            Err(err) => {
                warn!(intent = %intent, error = %err, "intent failed");
                report.errors.push(if err.is_transient() {
                    transient(1, err)
                } else {
                    CoreError::Execution(err)
                });
                Submission::Failed
            }
        }
    }
}

fn transient(attempts: u32, source: ExecutionError) -> CoreError {
    CoreError::TransientExecution { attempts, source }
}
