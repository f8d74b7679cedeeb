//! Candidate validation
//!
//! Synchronous filters run first, cheapest first; the liquidity and honeypot
//! probes run last behind a timeout.

pub mod bundled_detection;
pub mod probes;
pub mod rules;
pub mod types;
pub mod validator;

pub use bundled_detection::{CollusionReport, CollusionSignal, FundingGraphAnalyzer};
pub use probes::{HoneypotProbe, LiquidityProbe, SellQuoteProbe, SnapshotLiquidityProbe};
pub use rules::{CandidateFilter, FilterOutcome};
pub use types::{
    DeferReason, HolderInfo, LiquiditySnapshot, RejectReason, TokenCandidate, ValidationVerdict,
};
pub use validator::TokenValidator;
