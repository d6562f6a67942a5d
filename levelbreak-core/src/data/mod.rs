//! Market data access: the provider trait and an in-memory replay feed.

pub mod feed;
pub mod provider;

pub use feed::InMemoryFeed;
pub use provider::{DataError, MarketDataProvider};
