//! Token Sniper Core Library
//!
//! Validation pipeline, entry decisions and position risk engine for
//! speculative token sniping. Chain transport and transaction signing are
//! external and plug in through the traits in [`stream`] and [`trading`].

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod journal;
pub mod pipeline;
pub mod position;
pub mod strategy;
pub mod stream;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{RunStats, Sniper};
