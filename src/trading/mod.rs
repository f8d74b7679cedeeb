//! Trading module - order submission boundary
//!
//! Real signing and submission plug in behind [`Executor`]; the paper
//! executor fills everything locally for dry runs.

pub mod executor;
pub mod simulation;

pub use executor::{buy_with_retry, sell_with_retry, Executor, Receipt, RetryPolicy};
pub use simulation::{ExecutionCall, PaperExecutor};
