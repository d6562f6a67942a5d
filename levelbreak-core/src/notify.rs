//! Notification sink, fire-and-forget human-readable reports.

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

pub trait NotificationSink {
    fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Forwards notifications to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, message: &str) -> Result<(), NotifyError> {
        info!(target: "levelbreak::notify", "{message}");
        Ok(())
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl NotificationSink for NullNotifier {
    fn notify(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Deliver a notification; failures are logged and swallowed.
pub fn deliver(sink: &dyn NotificationSink, message: &str) {
    if let Err(err) = sink.notify(message) {
        warn!(error = %err, "notification dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Flaky {
        seen: RefCell<Vec<String>>,
    }

    impl NotificationSink for Flaky {
        fn notify(&self, message: &str) -> Result<(), NotifyError> {
            self.seen.borrow_mut().push(message.to_string());
            Err(NotifyError("smtp down".into()))
        }
    }

    #[test]
    fn failures_are_non_fatal() {
        let sink = Flaky {
            seen: RefCell::new(Vec::new()),
        };
        deliver(&sink, "breakout confirmed");
        deliver(&sink, "position closed");
        assert_eq!(sink.seen.borrow().len(), 2);
    }
}
