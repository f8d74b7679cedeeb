//! Shared data structures for the validation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the largest holders of a candidate token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderInfo {
    pub address: String,
    pub balance: f64,
    /// Address that first funded this holder, when known
    #[serde(default)]
    pub funding_source: Option<String>,
    /// Transactions sent by the holder (0 = fresh wallet)
    #[serde(default)]
    pub nonce: u64,
}

/// Pool liquidity at snapshot time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySnapshot {
    /// Quote-side reserves in USD
    pub quote_reserve_usd: f64,
    /// Token-side reserves
    #[serde(default)]
    pub token_reserve: f64,
}

/// Immutable snapshot of a token evaluated by the validator
///
/// Re-fetched from the market data provider whenever the candidate is deferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCandidate {
    /// Chain address of the token
    pub token: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Market cap in USD
    pub market_cap: f64,
    pub total_supply: f64,
    pub dev_balance: f64,
    #[serde(default)]
    pub liquidity: LiquiditySnapshot,
    #[serde(default)]
    pub top_holders: Vec<HolderInfo>,
}

impl TokenCandidate {
    /// Minutes elapsed since creation at `now` (negative if created in the future)
    pub fn age_minutes(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 60_000.0
    }

    /// First numeric field that is NaN, infinite or negative
    pub fn invalid_field(&self) -> Option<&'static str> {
        [
            ("market_cap", self.market_cap),
            ("total_supply", self.total_supply),
            ("dev_balance", self.dev_balance),
            ("liquidity.quote_reserve_usd", self.liquidity.quote_reserve_usd),
        ]
        .into_iter()
        .find(|(_, v)| !v.is_finite() || *v < 0.0)
        .map(|(name, _)| name)
    }

    /// Developer share of total supply in percent, `None` for a zero supply
    pub fn dev_holding_pct(&self) -> Option<f64> {
        if self.total_supply <= 0.0 {
            return None;
        }
        Some(self.dev_balance / self.total_supply * 100.0)
    }
}

/// Why a candidate was rejected outright
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Snapshot carries a value no filter can reason about
    InvalidSnapshot { field: String },
    TooOld { age_minutes: f64 },
    DevHoldingTooHigh { pct: f64 },
    /// Supply of zero makes the dev share undefined
    InvalidSupply,
    MarketCapTooHigh { market_cap: f64 },
    PoorRiskReward { multiple: f64 },
    Bundled { funder: Option<String>, holders: usize },
    BlockedName { pattern: String },
    InsufficientLiquidity,
    Honeypot,
}

impl RejectReason {
    pub fn description(&self) -> String {
        match self {
            RejectReason::InvalidSnapshot { field } => {
                format!("invalid snapshot value for {}", field)
            }
            RejectReason::TooOld { age_minutes } => format!("too old ({:.1} min)", age_minutes),
            RejectReason::DevHoldingTooHigh { pct } => {
                format!("dev holds {:.2}% of supply", pct)
            }
            RejectReason::InvalidSupply => "total supply is zero".to_string(),
            RejectReason::MarketCapTooHigh { market_cap } => {
                format!("market cap ${:.0} above entry band", market_cap)
            }
            RejectReason::PoorRiskReward { multiple } => {
                format!("reward multiple {:.2}x below minimum", multiple)
            }
            RejectReason::Bundled { funder, holders } => match funder {
                Some(f) => format!("{} holders funded by {}", holders, f),
                None => format!("bundled holders ({})", holders),
            },
            RejectReason::BlockedName { pattern } => format!("name matches '{}'", pattern),
            RejectReason::InsufficientLiquidity => "insufficient liquidity".to_string(),
            RejectReason::Honeypot => "sell simulation failed".to_string(),
        }
    }
}

/// Why a candidate should be looked at again later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeferReason {
    /// Market cap still below the entry band
    MarketCapTooLow { market_cap: f64 },
    ProbeTimeout { probe: String },
    ProbeUnavailable { probe: String },
}

impl DeferReason {
    pub fn description(&self) -> String {
        match self {
            DeferReason::MarketCapTooLow { market_cap } => {
                format!("market cap ${:.0} below entry band", market_cap)
            }
            DeferReason::ProbeTimeout { probe } => format!("{} probe timed out", probe),
            DeferReason::ProbeUnavailable { probe } => format!("{} probe unavailable", probe),
        }
    }
}

/// Result of one validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationVerdict {
    Accept,
    Reject(RejectReason),
    Defer(DeferReason),
}

impl ValidationVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, ValidationVerdict::Accept)
    }

    pub fn is_defer(&self) -> bool {
        matches!(self, ValidationVerdict::Defer(_))
    }
}
