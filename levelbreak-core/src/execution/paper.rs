//! Paper gateway: fills every intent at the current mark, keeps broker-side
//! position state, triggers resting stops and targets against each bar, and
//! can be scripted to fail. Used by the CLI replay and by tests that need an
//! authoritative "broker" to reconcile against.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, info};

use super::gateway::{ExecutionError, OrderGateway};
use super::intent::{ExecutionReport, PositionSnapshot, TradeIntent};
use crate::domain::{Bar, Side};

/// One accepted intent, for inspection after a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub intent: TradeIntent,
    pub price: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PaperGateway {
    next_ticket: u64,
    mark: Option<f64>,
    positions: BTreeMap<u64, PositionSnapshot>,
    scripted_failures: VecDeque<ExecutionError>,
    fills: Vec<PaperFill>,
    submissions: usize,
    realized_pnl: f64,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self {
            next_ticket: 1,
            ..Self::default()
        }
    }

    /// Price at which the next intents fill.
    pub fn set_mark(&mut self, price: f64) {
        self.mark = Some(price);
    }

    /// Fail the next submission with `err` (queued, first in first out).
    pub fn fail_next(&mut self, err: ExecutionError) {
        self.scripted_failures.push_back(err);
    }

    /// Simulate a manual stop edit made outside the pipeline.
    pub fn set_stop(&mut self, ticket: u64, stop: f64) -> Result<(), ExecutionError> {
        let position = self
            .positions
            .get_mut(&ticket)
            .ok_or(ExecutionError::UnknownTicket(ticket))?;
        position.stop = stop;
        Ok(())
    }

    /// Simulate a position closed outside the pipeline.
    pub fn close_externally(&mut self, ticket: u64) -> Option<PositionSnapshot> {
        self.positions.remove(&ticket)
    }

    pub fn fills(&self) -> &[PaperFill] {
        &self.fills
    }

    /// Total submissions seen, including failed ones.
    pub fn submissions(&self) -> usize {
        self.submissions
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    /// Realized profit in price units × lots.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    /// Close every position whose stop or target lies inside `bar`, then mark
    /// at its close. A bar reaching both fills the stop. Gaps fill at the open.
    pub fn process_bar(&mut self, bar: &Bar) -> Vec<PaperFill> {
        let mut triggered = Vec::new();
        for (&ticket, position) in &self.positions {
            let (stop_hit, target_hit) = match position.side {
                Side::Long => (bar.low <= position.stop, bar.high >= position.target),
                Side::Short => (bar.high >= position.stop, bar.low <= position.target),
            };
            let level = if stop_hit {
                position.stop
            } else if target_hit {
                position.target
            } else {
                continue;
            };
            let gapped = match position.side {
                Side::Long => (bar.open < level) == stop_hit,
                Side::Short => (bar.open > level) == stop_hit,
            };
            triggered.push((ticket, if gapped { bar.open } else { level }));
        }

        let mut fills = Vec::new();
        for (ticket, price) in triggered {
            let Some(position) = self.positions.remove(&ticket) else {
                continue;
            };
            self.realized_pnl +=
                position.side.profit(position.entry_price, price) * position.volume;
            info!(
                ticket,
                price,
                stop = position.stop,
                target = position.target,
                "resting stop or target filled"
            );
            let fill = PaperFill {
                intent: TradeIntent::ClosePosition {
                    ticket,
                    volume_fraction: 1.0,
                },
                price,
            };
            self.fills.push(fill.clone());
            fills.push(fill);
        }
        self.mark = Some(bar.close);
        fills
    }

    fn mark(&self) -> Result<f64, ExecutionError> {
        self.mark
            .ok_or_else(|| ExecutionError::Rejected("no mark price set".into()))
    }
}

impl OrderGateway for PaperGateway {
    fn name(&self) -> &str {
        "paper"
    }

    fn submit(&mut self, intent: &TradeIntent) -> Result<ExecutionReport, ExecutionError> {
        self.submissions += 1;
        if let Some(err) = self.scripted_failures.pop_front() {
            return Err(err);
        }

        let report = match *intent {
            TradeIntent::OpenPosition {
                side,
                size,
                stop,
                target,
            } => {
                if size <= 0.0 {
                    return Err(ExecutionError::Rejected(format!("invalid size {size}")));
                }
                let price = self.mark()?;
                let ticket = self.next_ticket.max(1);
                self.next_ticket = ticket + 1;
                self.positions.insert(
                    ticket,
                    PositionSnapshot {
                        ticket,
                        side,
                        volume: size,
                        entry_price: price,
                        stop,
                        target,
                    },
                );
                ExecutionReport {
                    ticket,
                    price,
                    remaining_volume: size,
                }
            }
            TradeIntent::ModifyStop { ticket, new_stop } => {
                let position = self
                    .positions
                    .get_mut(&ticket)
                    .ok_or(ExecutionError::UnknownTicket(ticket))?;
                position.stop = new_stop;
                ExecutionReport {
                    ticket,
                    price: new_stop,
                    remaining_volume: position.volume,
                }
            }
            TradeIntent::ClosePosition {
                ticket,
                volume_fraction,
            } => {
                if !(volume_fraction > 0.0 && volume_fraction <= 1.0) {
                    return Err(ExecutionError::Rejected(format!(
                        "invalid volume fraction {volume_fraction}"
                    )));
                }
                let price = self.mark()?;
                let position = self
                    .positions
                    .get_mut(&ticket)
                    .ok_or(ExecutionError::UnknownTicket(ticket))?;
                let closed = position.volume * volume_fraction;
                self.realized_pnl += position.side.profit(position.entry_price, price) * closed;
                position.volume -= closed;
                let remaining = if volume_fraction >= 1.0 || position.volume <= 1e-9 {
                    self.positions.remove(&ticket);
                    0.0
                } else {
                    position.volume
                };
                ExecutionReport {
                    ticket,
                    price,
                    remaining_volume: remaining,
                }
            }
        };

        debug!(intent = %intent, price = report.price, "paper fill");
        self.fills.push(PaperFill {
            intent: intent.clone(),
            price: report.price,
        });
        Ok(report)
    }

    fn position(&self, ticket: u64) -> Option<PositionSnapshot> {
        self.positions.get(&ticket).cloned()
    }
}
