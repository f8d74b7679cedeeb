//! Entry decisions and portfolio risk
//!
//! - `portfolio_risk` - shared ledger of open slots and daily loss
//! - `sizing` - order size for an accepted candidate
//! - `engine` - strategy trait and the engine that runs it

pub mod engine;
pub mod portfolio_risk;
pub mod sizing;

pub use engine::{Decision, DecisionEngine, DecisionStrategy, SkipReason, SniperStrategy};
pub use portfolio_risk::{LedgerSnapshot, RiskBlock, RiskLedger};
pub use sizing::PositionSizer;
