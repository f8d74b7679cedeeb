//! Decision Engine
//!
//! Turns a validation verdict into a sized buy order or a skip. Strategies
//! are interchangeable behind [`DecisionStrategy`]; the default
//! [`SniperStrategy`] buys every accepted candidate the risk ledger has room for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::filter::types::{TokenCandidate, ValidationVerdict};

use super::portfolio_risk::{RiskBlock, RiskLedger};
use super::sizing::PositionSizer;

/// Why no order was placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Auto-snipe switched off
    Disabled,
    /// Validator did not accept the candidate
    NotAccepted(ValidationVerdict),
    /// Sizing produced nothing to buy
    ZeroSize,
    /// Portfolio limits block the entry
    Risk(RiskBlock),
}

impl SkipReason {
    pub fn description(&self) -> String {
        match self {
            SkipReason::Disabled => "auto-snipe disabled".to_string(),
            SkipReason::NotAccepted(verdict) => format!("verdict {:?}", verdict),
            SkipReason::ZeroSize => "position size is zero".to_string(),
            SkipReason::Risk(block) => block.description(),
        }
    }
}

/// Buy or skip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Buy {
        token: String,
        amount: f64,
        max_slippage_bps: u32,
    },
    Skip(SkipReason),
}

impl Decision {
    pub fn is_buy(&self) -> bool {
        matches!(self, Decision::Buy { .. })
    }
}

/// Buy-decision capability
///
/// A `Buy` holds a reserved slot in the ledger. The caller must cancel the
/// reservation if the order never fills.
#[async_trait]
pub trait DecisionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decide as of `now`, the time of the event that produced the verdict
    async fn decide(
        &self,
        candidate: &TokenCandidate,
        verdict: &ValidationVerdict,
        ledger: &RiskLedger,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Decision;
}

/// Fixed-size sniping of accepted candidates
pub struct SniperStrategy;

#[async_trait]
impl DecisionStrategy for SniperStrategy {
    fn name(&self) -> &'static str {
        "sniper"
    }

    async fn decide(
        &self,
        candidate: &TokenCandidate,
        verdict: &ValidationVerdict,
        ledger: &RiskLedger,
        config: &Config,
        now: DateTime<Utc>,
    ) -> Decision {
        if !config.trading.auto_snipe_enabled {
            return Decision::Skip(SkipReason::Disabled);
        }

        if !verdict.is_accept() {
            return Decision::Skip(SkipReason::NotAccepted(verdict.clone()));
        }

        let amount = PositionSizer::new(config).calculate_size();
        if amount <= 0.0 {
            return Decision::Skip(SkipReason::ZeroSize);
        }

        if let Err(block) = ledger.try_reserve(&candidate.token, amount, now).await {
            return Decision::Skip(SkipReason::Risk(block));
        }

        Decision::Buy {
            token: candidate.token.clone(),
            amount,
            max_slippage_bps: config.trading.max_slippage_bps,
        }
    }
}

/// Runs the active strategy against the shared ledger
pub struct DecisionEngine {
    strategy: Box<dyn DecisionStrategy>,
    ledger: Arc<RiskLedger>,
    config: Arc<Config>,
}

impl DecisionEngine {
    pub fn new(
        strategy: Box<dyn DecisionStrategy>,
        ledger: Arc<RiskLedger>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            strategy,
            ledger,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<RiskLedger> {
        &self.ledger
    }

    pub async fn decide(&self, candidate: &TokenCandidate, verdict: &ValidationVerdict) -> Decision {
        self.decide_at(candidate, verdict, Utc::now()).await
    }

    /// Decide as of `now`
    pub async fn decide_at(
        &self,
        candidate: &TokenCandidate,
        verdict: &ValidationVerdict,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = self
            .strategy
            .decide(candidate, verdict, &self.ledger, &self.config, now)
            .await;

        match &decision {
            Decision::Buy { amount, .. } => info!(
                mint = %candidate.token,
                strategy = self.strategy.name(),
                amount = %amount,
                market_cap = %candidate.market_cap,
                "Entry approved"
            ),
            Decision::Skip(SkipReason::NotAccepted(_)) => {}
            Decision::Skip(reason) => debug!(
                mint = %candidate.token,
                strategy = self.strategy.name(),
                reason = %reason.description(),
                "Entry skipped"
            ),
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::test_support::healthy_candidate;
    use crate::filter::types::RejectReason;

    fn engine(config: Config) -> DecisionEngine {
        let ledger = Arc::new(RiskLedger::new(&config.risk));
        DecisionEngine::new(Box::new(SniperStrategy), ledger, Arc::new(config))
    }

    #[tokio::test]
    async fn test_buy_on_accept() {
        let engine = engine(Config::default());
        let c = healthy_candidate("tok", Utc::now());

        let decision = engine.decide(&c, &ValidationVerdict::Accept).await;
        assert_eq!(
            decision,
            Decision::Buy {
                token: "tok".into(),
                amount: 5.0,
                max_slippage_bps: 1500
            }
        );
        assert_eq!(engine.ledger().open_positions().await, 1);
    }

    #[tokio::test]
    async fn test_skip_on_reject() {
        let engine = engine(Config::default());
        let c = healthy_candidate("tok", Utc::now());
        let verdict = ValidationVerdict::Reject(RejectReason::Honeypot);

        let decision = engine.decide(&c, &verdict).await;
        assert_eq!(decision, Decision::Skip(SkipReason::NotAccepted(verdict)));
        assert_eq!(engine.ledger().open_positions().await, 0);
    }

    #[tokio::test]
    async fn test_skip_at_max_concurrent() {
        let mut config = Config::default();
        config.risk.max_concurrent_positions = 2;
        let engine = engine(config);
        let now = Utc::now();

        for token in ["a", "b"] {
            let d = engine
                .decide(&healthy_candidate(token, now), &ValidationVerdict::Accept)
                .await;
            assert!(d.is_buy());
        }

        let d = engine
            .decide(&healthy_candidate("c", now), &ValidationVerdict::Accept)
            .await;
        assert_eq!(
            d,
            Decision::Skip(SkipReason::Risk(RiskBlock::MaxPositionsReached {
                current: 2,
                max: 2
            }))
        );
        assert_eq!(engine.ledger().open_positions().await, 2);
    }

    #[tokio::test]
    async fn test_skip_when_daily_loss_breached() {
        let engine = engine(Config::default());
        // Ceiling is 5% of 500
        engine.ledger().record_realized(-25.0, Utc::now()).await;

        let d = engine
            .decide(&healthy_candidate("a", Utc::now()), &ValidationVerdict::Accept)
            .await;
        assert!(matches!(
            d,
            Decision::Skip(SkipReason::Risk(RiskBlock::DailyLossLimitReached { .. }))
        ));
    }

    #[tokio::test]
    async fn test_disabled() {
        let mut config = Config::default();
        config.trading.auto_snipe_enabled = false;
        let engine = engine(config);
        let d = engine
            .decide(&healthy_candidate("a", Utc::now()), &ValidationVerdict::Accept)
            .await;
        assert_eq!(d, Decision::Skip(SkipReason::Disabled));
    }
}
