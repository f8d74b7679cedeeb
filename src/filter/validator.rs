//! Token validation pipeline
//!
//! Runs the synchronous filter chain, then the external probes. The first
//! `Reject` or `Defer` short-circuits everything after it. A probe that times
//! out or errors defers the candidate; it never accepts it.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::filter::probes::{HoneypotProbe, LiquidityProbe};
use crate::filter::rules::{build_chain, CandidateFilter, FilterOutcome};
use crate::filter::types::{DeferReason, RejectReason, TokenCandidate, ValidationVerdict};

/// Ordered filter chain plus probe stage
pub struct TokenValidator {
    chain: Vec<Box<dyn CandidateFilter>>,
    liquidity: Arc<dyn LiquidityProbe>,
    honeypot: Arc<dyn HoneypotProbe>,
    probe_timeout: Duration,
}

impl TokenValidator {
    pub fn new(
        config: &Config,
        liquidity: Arc<dyn LiquidityProbe>,
        honeypot: Arc<dyn HoneypotProbe>,
    ) -> Result<Self> {
        Ok(Self {
            chain: build_chain(config)?,
            liquidity,
            honeypot,
            probe_timeout: Duration::from_millis(config.probes.timeout_ms),
        })
    }

    /// Names of the synchronous filters in evaluation order
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|f| f.name()).collect()
    }

    /// Evaluate a candidate against the wall clock
    pub async fn evaluate(&self, candidate: &TokenCandidate) -> ValidationVerdict {
        self.evaluate_at(candidate, Utc::now()).await
    }

    /// Evaluate a candidate as of `now`
    pub async fn evaluate_at(
        &self,
        candidate: &TokenCandidate,
        now: DateTime<Utc>,
    ) -> ValidationVerdict {
        if let Some(field) = candidate.invalid_field() {
            warn!(mint = %candidate.token, field = field, "Candidate rejected: invalid snapshot");
            return ValidationVerdict::Reject(RejectReason::InvalidSnapshot {
                field: field.to_string(),
            });
        }

        for filter in &self.chain {
            match filter.check(candidate, now) {
                FilterOutcome::Pass => continue,
                FilterOutcome::Reject(reason) => {
                    debug!(
                        mint = %candidate.token,
                        filter = filter.name(),
                        reason = %reason.description(),
                        "Candidate rejected"
                    );
                    return ValidationVerdict::Reject(reason);
                }
                FilterOutcome::Defer(reason) => {
                    debug!(
                        mint = %candidate.token,
                        filter = filter.name(),
                        reason = %reason.description(),
                        "Candidate deferred"
                    );
                    return ValidationVerdict::Defer(reason);
                }
            }
        }

        let liquidity_name = self.liquidity.name();
        match self
            .run_probe(liquidity_name, self.liquidity.check(candidate))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(mint = %candidate.token, "Candidate rejected: insufficient liquidity");
                return ValidationVerdict::Reject(RejectReason::InsufficientLiquidity);
            }
            Err(defer) => return ValidationVerdict::Defer(defer),
        }

        let honeypot_name = self.honeypot.name();
        match self
            .run_probe(honeypot_name, self.honeypot.simulate_sell(candidate))
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(mint = %candidate.token, "Candidate rejected: sell simulation failed");
                return ValidationVerdict::Reject(RejectReason::Honeypot);
            }
            Err(defer) => return ValidationVerdict::Defer(defer),
        }

        debug!(
            mint = %candidate.token,
            market_cap = %candidate.market_cap,
            "Candidate accepted"
        );
        ValidationVerdict::Accept
    }

    async fn run_probe<F>(&self, probe: &str, call: F) -> std::result::Result<bool, DeferReason>
    where
        F: Future<Output = Result<bool>>,
    {
        match tokio::time::timeout(self.probe_timeout, call).await {
            Ok(Ok(passed)) => Ok(passed),
            Ok(Err(e)) => {
                warn!(probe = probe, error = %e, "Probe failed, deferring candidate");
                Err(DeferReason::ProbeUnavailable {
                    probe: probe.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    probe = probe,
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Probe timed out, deferring candidate"
                );
                Err(DeferReason::ProbeTimeout {
                    probe: probe.to_string(),
                })
            }
        }
    }
}
