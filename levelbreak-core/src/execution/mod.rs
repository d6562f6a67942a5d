//! Order execution seam: intents, the gateway trait, retries, and a paper gateway.

pub mod gateway;
pub mod intent;
pub mod paper;

pub use gateway::{
    ExecutionError, OrderGateway, PendingIntent, RetryOutcome, RetryQueue, Submitted,
};
pub use intent::{ExecutionReport, PositionSnapshot, TradeIntent};
pub use paper::{PaperFill, PaperGateway};
