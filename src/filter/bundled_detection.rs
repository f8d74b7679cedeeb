//! Bundled Wallet Detection
//!
//! Builds a funding graph over a token's top holders to spot coordinated
//! ("bundled") wallets that will typically dump together.
//!
//! Detection heuristics:
//! 1. Common funding: one source funded `common_funder_threshold`+ distinct holders
//! 2. Fresh wallets: more than `zero_nonce_majority` of holders have nonce 0
//! 3. Identical balances (opt-in): N+ holders with the same non-zero balance
//!
//! False positives only forgo a trade, so every heuristic flags on its own.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::BundlingConfig;
use crate::filter::types::HolderInfo;

/// Reason for bundle detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollusionSignal {
    /// Multiple holders funded from the same source
    CommonFunding { source: String, holders: usize },
    /// Most holders are freshly created wallets
    ZeroNonceMajority { ratio: f64 },
    /// Multiple holders with exactly the same balance
    IdenticalBalances { balance: f64, holders: usize },
}

/// Outcome of one funding-graph pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollusionReport {
    /// Distinct holders funded by the busiest known source
    pub max_shared_funder: Option<(String, usize)>,
    /// Fraction of holders with nonce 0
    pub zero_nonce_ratio: f64,
    pub signals: Vec<CollusionSignal>,
}

impl CollusionReport {
    pub fn is_collusive(&self) -> bool {
        !self.signals.is_empty()
    }

    /// Funder and holder count to surface in a rejection
    pub fn primary(&self) -> (Option<String>, usize) {
        match self.signals.first() {
            Some(CollusionSignal::CommonFunding { source, holders }) => {
                (Some(source.clone()), *holders)
            }
            Some(CollusionSignal::IdenticalBalances { holders, .. }) => (None, *holders),
            _ => (None, 0),
        }
    }
}

/// Funding-graph analyzer over a holder snapshot
///
/// Pure: holds only thresholds and never retains graph data between calls.
#[derive(Debug, Clone)]
pub struct FundingGraphAnalyzer {
    zero_nonce_majority: f64,
    identical_balance_threshold: Option<usize>,
}

impl FundingGraphAnalyzer {
    pub fn new(config: &BundlingConfig) -> Self {
        Self {
            zero_nonce_majority: config.zero_nonce_majority,
            identical_balance_threshold: config.identical_balance_threshold,
        }
    }

    /// True when the holders look coordinated at the given shared-funder threshold
    pub fn detect_collusion(&self, holders: &[HolderInfo], threshold: usize) -> bool {
        self.analyze(holders, threshold).is_collusive()
    }

    /// Run every heuristic and report what fired
    pub fn analyze(&self, holders: &[HolderInfo], threshold: usize) -> CollusionReport {
        let mut report = CollusionReport::default();
        if holders.is_empty() {
            return report;
        }

        // source -> distinct holders it funded
        let mut funded: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for holder in holders {
            if let Some(source) = holder.funding_source.as_deref() {
                funded
                    .entry(source)
                    .or_default()
                    .insert(holder.address.as_str());
            }
        }

        // Largest group wins; ties resolve to the lowest address
        report.max_shared_funder = funded
            .iter()
            .map(|(source, set)| (source.to_string(), set.len()))
            .fold(None, |best: Option<(String, usize)>, (source, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((source, count)),
            });

        if let Some((source, count)) = &report.max_shared_funder {
            if *count >= threshold {
                debug!(source = %source, holders = count, "Common funding source detected");
                report.signals.push(CollusionSignal::CommonFunding {
                    source: source.clone(),
                    holders: *count,
                });
            }
        }

        let zero_nonce = holders.iter().filter(|h| h.nonce == 0).count();
        report.zero_nonce_ratio = zero_nonce as f64 / holders.len() as f64;
        if report.zero_nonce_ratio > self.zero_nonce_majority {
            debug!(
                ratio = %format!("{:.2}", report.zero_nonce_ratio),
                "Zero-nonce majority among top holders"
            );
            report.signals.push(CollusionSignal::ZeroNonceMajority {
                ratio: report.zero_nonce_ratio,
            });
        }

        if let Some(min_group) = self.identical_balance_threshold {
            if let Some(signal) = check_identical_balances(holders, min_group) {
                report.signals.push(signal);
            }
        }

        report
    }
}

fn check_identical_balances(holders: &[HolderInfo], min_group: usize) -> Option<CollusionSignal> {
    // Group by exact bit pattern; balances come from the same snapshot source
    let mut by_balance: BTreeMap<u64, usize> = BTreeMap::new();
    for holder in holders.iter().filter(|h| h.balance > 0.0) {
        *by_balance.entry(holder.balance.to_bits()).or_default() += 1;
    }

    by_balance
        .into_iter()
        .filter(|(_, count)| *count >= min_group)
        .max_by_key(|(_, count)| *count)
        .map(|(bits, count)| {
            let balance = f64::from_bits(bits);
            debug!(balance = %balance, holders = count, "Identical balance bundle detected");
            CollusionSignal::IdenticalBalances {
                balance,
                holders: count,
            }
        })
}
