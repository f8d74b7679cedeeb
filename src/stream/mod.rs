//! Stream module - chain events and market data
//!
//! Live transports implement [`EventSource`] and [`MarketDataProvider`];
//! the replay source drives the same pipeline from a recording.

pub mod events;
pub mod replay;

pub use events::{ChainEvent, EventSource, MarketDataProvider, MarketTick};
pub use replay::{InMemoryMarketData, ReplayRecord, ReplaySource};
