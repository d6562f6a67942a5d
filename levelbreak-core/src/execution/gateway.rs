//! Order gateway trait and the bounded retry queue for transient failures.

use thiserror::Error;
use tracing::{error, warn};

use super::intent::{ExecutionReport, PositionSnapshot, TradeIntent};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The gateway refused the intent outright; retrying will not help.
    #[error("intent rejected: {0}")]
    Rejected(String),

    /// Temporary failure (busy, requote, connection drop); retry later.
    #[error("transient execution failure: {0}")]
    Transient(String),

    #[error("unknown ticket #{0}")]
    UnknownTicket(u64),
}

impl ExecutionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::Transient(_))
    }
}

/// Order execution collaborator.
pub trait OrderGateway {
    fn name(&self) -> &str;

    /// Submit one intent and wait for the result.
    fn submit(&mut self, intent: &TradeIntent) -> Result<ExecutionReport, ExecutionError>;

    /// Authoritative broker-side state of a position; `None` once closed.
    fn position(&self, ticket: u64) -> Option<PositionSnapshot>;
}

/// An intent waiting for another attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingIntent {
    pub intent: TradeIntent,
    pub attempts: u32,
    pub last_error: ExecutionError,
}

/// What happened to a freshly submitted intent.
#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
    Filled(ExecutionReport),
    /// Failed transiently and queued; carries the failure.
    Queued(ExecutionError),
}

/// Result of draining the retry queue.
#[derive(Debug, Default)]
pub struct RetryOutcome {
    pub succeeded: Vec<(TradeIntent, ExecutionReport)>,
    /// Failed again, still queued for the next cycle.
    pub retrying: Vec<PendingIntent>,
    /// Intents that exhausted the retry budget.
    pub abandoned: Vec<PendingIntent>,
}

/// Bounded retry queue. Transient failures are re-submitted on later cycles
/// until `max_retries` attempts have been made; nothing is retried silently
/// forever.
#[derive(Debug, Clone, Default)]
pub struct RetryQueue {
    max_retries: u32,
    pending: Vec<PendingIntent>,
}

impl RetryQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Submit now; a transient failure is queued, anything else returned.
    pub fn submit(
        &mut self,
        gateway: &mut dyn OrderGateway,
        intent: TradeIntent,
    ) -> Result<Submitted, ExecutionError> {
        match gateway.submit(&intent) {
            Ok(report) => Ok(Submitted::Filled(report)),
            Err(err) if err.is_transient() && self.max_retries > 1 => {
                warn!(
                    gateway = gateway.name(),
                    intent = %intent,
                    error = %err,
                    "intent failed transiently, queued for retry"
                );
                self.enqueue(intent, err.clone());
                Ok(Submitted::Queued(err))
            }
            Err(err) => Err(err),
        }
    }

    fn enqueue(&mut self, intent: TradeIntent, err: ExecutionError) {
        // A newer intent for the same ticket and kind supersedes the queued one.
        self.pending
            .retain(|p| !(p.intent.ticket() == intent.ticket() && p.intent.kind() == intent.kind()));
        self.pending.push(PendingIntent {
            intent,
            attempts: 1,
            last_error: err,
        });
    }

    /// Drop queued intents for a ticket (position closed).
    pub fn forget_ticket(&mut self, ticket: u64) {
        self.pending.retain(|p| p.intent.ticket() != Some(ticket));
    }

    /// Re-submit every queued intent once.
    pub fn retry(&mut self, gateway: &mut dyn OrderGateway) -> RetryOutcome {
        let mut outcome = RetryOutcome::default();
        let mut still_pending = Vec::new();

        for mut pending in std::mem::take(&mut self.pending) {
            pending.attempts += 1;
            match gateway.submit(&pending.intent) {
                Ok(report) => outcome.succeeded.push((pending.intent, report)),
                Err(err) if err.is_transient() && pending.attempts < self.max_retries => {
                    warn!(
                        intent = %pending.intent,
                        attempts = pending.attempts,
                        error = %err,
                        "retry failed, will try again next cycle"
                    );
                    pending.last_error = err;
                    outcome.retrying.push(pending.clone());
                    still_pending.push(pending);
                }
                Err(err) => {
                    error!(
                        intent = %pending.intent,
                        attempts = pending.attempts,
                        error = %err,
                        "retry budget exhausted, intent abandoned"
                    );
                    pending.last_error = err;
                    outcome.abandoned.push(pending);
                }
            }
        }

        self.pending = still_pending;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use crate::execution::PaperGateway;

    fn open_intent() -> TradeIntent {
        TradeIntent::OpenPosition {
            side: Side::Long,
            size: 0.1,
            stop: 1.0950,
            target: 1.1100,
        }
    }

    #[test]
    fn transient_failure_is_queued_and_retried() {
        let mut gw = PaperGateway::new();
        gw.set_mark(1.1000);
        gw.fail_next(ExecutionError::Transient("busy".into()));

        let mut queue = RetryQueue::new(3);
        assert_eq!(
            queue.submit(&mut gw, open_intent()),
            Ok(Submitted::Queued(ExecutionError::Transient("busy".into())))
        );
        assert_eq!(queue.len(), 1);

        let outcome = queue.retry(&mut gw);
        assert_eq!(outcome.succeeded.len(), 1);
        assert!(outcome.abandoned.is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn retry_budget_is_bounded() {
        let mut gw = PaperGateway::new();
        gw.set_mark(1.1000);
        for _ in 0..5 {
            gw.fail_next(ExecutionError::Transient("busy".into()));
        }

        let mut queue = RetryQueue::new(3);
        queue.submit(&mut gw, open_intent()).unwrap();

        let outcome = queue.retry(&mut gw);
        assert!(outcome.succeeded.is_empty());
        assert!(outcome.abandoned.is_empty());
        assert_eq!(outcome.retrying.len(), 1);
        assert_eq!(outcome.retrying[0].attempts, 2);
        assert_eq!(queue.len(), 1);

        let outcome = queue.retry(&mut gw);
        assert_eq!(outcome.abandoned.len(), 1);
        assert_eq!(outcome.abandoned[0].attempts, 3);
        assert!(outcome.retrying.is_empty());
        assert!(queue.is_empty());
        assert_eq!(gw.submissions(), 3);
    }

    #[test]
    fn permanent_rejection_is_returned_immediately() {
        let mut gw = PaperGateway::new();
        gw.fail_next(ExecutionError::Rejected("market closed".into()));
        let mut queue = RetryQueue::new(3);
        let err = queue.submit(&mut gw, open_intent()).unwrap_err();
        assert!(!err.is_transient());
        assert!(queue.is_empty());
    }

    #[test]
    fn newer_intent_supersedes_queued_one_for_same_ticket() {
        let mut gw = PaperGateway::new();
        gw.fail_next(ExecutionError::Transient("busy".into()));
        gw.fail_next(ExecutionError::Transient("busy".into()));

        let mut queue = RetryQueue::new(3);
        queue
            .submit(&mut gw, TradeIntent::ModifyStop { ticket: 1, new_stop: 1.1000 })
            .unwrap();
        queue
            .submit(&mut gw, TradeIntent::ModifyStop { ticket: 1, new_stop: 1.1010 })
            .unwrap();
        assert_eq!(queue.len(), 1);

        queue.forget_ticket(1);
        assert!(queue.is_empty());
    }
}
