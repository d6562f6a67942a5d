//! Error taxonomy of the pipeline.
//!
//! | Kind | Recovery |
//! |------|----------|
//! | `Configuration` | fatal at startup |
//! | `InsufficientData` | recoverable; detection yields no levels |
//! | `StaleState` | recovered by re-deriving flags from observed state |
//! | `TransientExecution` | retried on later cycles within the retry budget |
//! | `Execution` | intent refused outright; reported, not retried |

use crate::config::ConfigError;
use crate::data::DataError;
use crate::domain::Timeframe;
use crate::execution::ExecutionError;
use crate::orchestrator::ContextKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("insufficient data for {symbol} {timeframe}: {available} bars, {required} required")]
    InsufficientData {
        symbol: String,
        timeframe: Timeframe,
        available: usize,
        required: usize,
    },

    #[error("stale state for ticket {ticket}: {detail}")]
    StaleState { ticket: u64, detail: String },

    #[error("execution failed after {attempts} attempt(s): {source}")]
    TransientExecution {
        attempts: u32,
        #[source]
        source: ExecutionError,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("no strategy context registered for {0}")]
    UnknownContext(ContextKey),

    #[error("strategy context {0} is already registered")]
    DuplicateContext(ContextKey),
}

impl CoreError {
    /// Whether the pipeline may continue with the next cycle.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CoreError::Configuration(_)
                | CoreError::UnknownContext(_)
                | CoreError::DuplicateContext(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_fatal() {
        let err = CoreError::from(ConfigError::Invalid {
            field: "min_touches",
            reason: "must be at least 1".into(),
        });
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "configuration error: invalid value for `min_touches`: must be at least 1"
        );
    }

    #[test]
    fn runtime_errors_are_recoverable() {
        let err = CoreError::InsufficientData {
            symbol: "EURUSD".into(),
            timeframe: Timeframe::H1,
            available: 3,
            required: 5,
        };
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "insufficient data for EURUSD H1: 3 bars, 5 required"
        );

        let err = CoreError::TransientExecution {
            attempts: 3,
            source: ExecutionError::Transient("gateway busy".into()),
        };
        assert!(err.is_recoverable());
    }
}
