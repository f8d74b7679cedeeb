//! External probes consulted after the synchronous filters
//!
//! Probes are the only suspension points in validation. The validator wraps
//! every call in a timeout, so implementations need not bound themselves.

use async_trait::async_trait;

use crate::error::Result;
use crate::filter::types::TokenCandidate;

/// Is there enough liquidity to enter and exit?
#[async_trait]
pub trait LiquidityProbe: Send + Sync {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    async fn check(&self, candidate: &TokenCandidate) -> Result<bool>;
}

/// Can the token actually be sold?
#[async_trait]
pub trait HoneypotProbe: Send + Sync {
    fn name(&self) -> &'static str {
        "honeypot"
    }

    /// `Ok(true)` when a simulated sell succeeds
    async fn simulate_sell(&self, candidate: &TokenCandidate) -> Result<bool>;
}

/// Passes when the pool's quote side holds at least `min_quote_usd`
pub struct SnapshotLiquidityProbe {
    min_quote_usd: f64,
}

impl SnapshotLiquidityProbe {
    pub fn new(min_quote_usd: f64) -> Self {
        Self { min_quote_usd }
    }
}

#[async_trait]
impl LiquidityProbe for SnapshotLiquidityProbe {
    async fn check(&self, candidate: &TokenCandidate) -> Result<bool> {
        Ok(candidate.liquidity.quote_reserve_usd >= self.min_quote_usd)
    }
}

/// Quotes a small sell against the snapshot reserves (constant product)
///
/// A pool with no quote reserves, or one that would return nothing for the
/// sell, is treated as a honeypot.
pub struct SellQuoteProbe {
    /// Fraction of token reserves to quote
    probe_fraction: f64,
}

impl SellQuoteProbe {
    pub fn new() -> Self {
        Self {
            probe_fraction: 0.001,
        }
    }

    fn quote(&self, candidate: &TokenCandidate) -> f64 {
        let pool = &candidate.liquidity;
        if pool.quote_reserve_usd <= 0.0 {
            return 0.0;
        }
        if pool.token_reserve <= 0.0 {
            // Reserves unknown on the token side: quote reserves alone decide
            return pool.quote_reserve_usd;
        }
        let amount_in = pool.token_reserve * self.probe_fraction;
        pool.quote_reserve_usd * amount_in / (pool.token_reserve + amount_in)
    }
}

impl Default for SellQuoteProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HoneypotProbe for SellQuoteProbe {
    async fn simulate_sell(&self, candidate: &TokenCandidate) -> Result<bool> {
        Ok(self.quote(candidate) > 0.0)
    }
}
