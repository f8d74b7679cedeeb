//! Synchronous candidate filters
//!
//! Each filter is a pure check with one shared signature. The validator runs
//! them in the order returned by [`build_chain`], cheapest first, and stops
//! at the first non-pass outcome.

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::bundled_detection::FundingGraphAnalyzer;
use crate::filter::types::{DeferReason, RejectReason, TokenCandidate};

/// Outcome of a single filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Pass,
    Reject(RejectReason),
    Defer(DeferReason),
}

impl FilterOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterOutcome::Pass)
    }
}

/// One stage of the filter chain
pub trait CandidateFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, candidate: &TokenCandidate, now: DateTime<Utc>) -> FilterOutcome;
}

/// Rejects tokens older than the configured age
pub struct AgeFilter {
    max_age_minutes: f64,
}

impl CandidateFilter for AgeFilter {
    fn name(&self) -> &'static str {
        "age"
    }

    fn check(&self, candidate: &TokenCandidate, now: DateTime<Utc>) -> FilterOutcome {
        let age = candidate.age_minutes(now);
        if age > self.max_age_minutes {
            return FilterOutcome::Reject(RejectReason::TooOld { age_minutes: age });
        }
        FilterOutcome::Pass
    }
}

/// Rejects tokens where the developer wallet holds too much supply
pub struct DevHoldingFilter {
    max_pct: f64,
}

impl CandidateFilter for DevHoldingFilter {
    fn name(&self) -> &'static str {
        "dev_holding"
    }

    fn check(&self, candidate: &TokenCandidate, _now: DateTime<Utc>) -> FilterOutcome {
        match candidate.dev_holding_pct() {
            None => FilterOutcome::Reject(RejectReason::InvalidSupply),
            Some(pct) if pct > self.max_pct => {
                FilterOutcome::Reject(RejectReason::DevHoldingTooHigh { pct })
            }
            Some(_) => FilterOutcome::Pass,
        }
    }
}

/// Entry band: too early defers, too late rejects
pub struct MarketCapZoneFilter {
    min: f64,
    max: f64,
}

impl CandidateFilter for MarketCapZoneFilter {
    fn name(&self) -> &'static str {
        "market_cap_zone"
    }

    fn check(&self, candidate: &TokenCandidate, _now: DateTime<Utc>) -> FilterOutcome {
        let market_cap = candidate.market_cap;
        if market_cap < self.min {
            FilterOutcome::Defer(DeferReason::MarketCapTooLow { market_cap })
        } else if market_cap > self.max {
            FilterOutcome::Reject(RejectReason::MarketCapTooHigh { market_cap })
        } else {
            FilterOutcome::Pass
        }
    }
}

/// Rejects entries whose upside to the profit target is too small
pub struct RiskRewardFilter {
    target_mcap: f64,
    min_multiple: f64,
}

impl CandidateFilter for RiskRewardFilter {
    fn name(&self) -> &'static str {
        "risk_reward"
    }

    fn check(&self, candidate: &TokenCandidate, _now: DateTime<Utc>) -> FilterOutcome {
        if candidate.market_cap <= 0.0 {
            return FilterOutcome::Reject(RejectReason::PoorRiskReward { multiple: 0.0 });
        }
        let multiple = self.target_mcap / candidate.market_cap;
        if multiple < self.min_multiple {
            return FilterOutcome::Reject(RejectReason::PoorRiskReward { multiple });
        }
        FilterOutcome::Pass
    }
}

/// Delegates to the funding-graph analyzer
pub struct BundlingFilter {
    analyzer: FundingGraphAnalyzer,
    threshold: usize,
}

impl CandidateFilter for BundlingFilter {
    fn name(&self) -> &'static str {
        "bundling"
    }

    fn check(&self, candidate: &TokenCandidate, _now: DateTime<Utc>) -> FilterOutcome {
        let report = self.analyzer.analyze(&candidate.top_holders, self.threshold);
        if !report.is_collusive() {
            return FilterOutcome::Pass;
        }
        debug!(
            mint = %candidate.token,
            signals = ?report.signals,
            "Candidate holders look bundled"
        );
        let (funder, holders) = report.primary();
        FilterOutcome::Reject(RejectReason::Bundled { funder, holders })
    }
}

/// Rejects names or symbols matching a blocked pattern
pub struct BlockedNameFilter {
    patterns: Vec<Regex>,
}

impl BlockedNameFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidRegex(e.to_string()))?;
        Ok(Self { patterns })
    }
}

impl CandidateFilter for BlockedNameFilter {
    fn name(&self) -> &'static str {
        "blocked_name"
    }

    fn check(&self, candidate: &TokenCandidate, _now: DateTime<Utc>) -> FilterOutcome {
        let fields = [candidate.name.as_deref(), candidate.symbol.as_deref()];
        for pattern in &self.patterns {
            if fields.iter().flatten().any(|field| pattern.is_match(field)) {
                return FilterOutcome::Reject(RejectReason::BlockedName {
                    pattern: pattern.to_string(),
                });
            }
        }
        FilterOutcome::Pass
    }
}

/// Build the ordered filter chain from config
pub fn build_chain(config: &Config) -> Result<Vec<Box<dyn CandidateFilter>>> {
    let filters = &config.filters;
    let mut chain: Vec<Box<dyn CandidateFilter>> = vec![
        Box::new(AgeFilter {
            max_age_minutes: filters.max_age_minutes as f64,
        }),
        Box::new(DevHoldingFilter {
            max_pct: filters.max_dev_holding_pct,
        }),
        Box::new(MarketCapZoneFilter {
            min: filters.min_market_cap,
            max: filters.max_market_cap,
        }),
        Box::new(RiskRewardFilter {
            target_mcap: filters
                .take_profit_target_mcap
                .unwrap_or(config.exits.migration_mcap),
            min_multiple: filters.min_profit_multiple,
        }),
    ];

    if config.bundling.enabled {
        chain.push(Box::new(BundlingFilter {
            analyzer: FundingGraphAnalyzer::new(&config.bundling),
            threshold: config.bundling.common_funder_threshold,
        }));
    }

    if !filters.blocked_patterns.is_empty() {
        chain.push(Box::new(BlockedNameFilter::new(&filters.blocked_patterns)?));
    }

    Ok(chain)
}
