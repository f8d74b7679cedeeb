//! Sniper pipeline
//!
//! Event loop wiring the stages together:
//!
//! ```text
//! TokenCreated ─► snapshot ─► TokenValidator ─► DecisionEngine ─► Executor.buy ─► PositionManager
//! PriceUpdate  ─► PositionManager (open position) or re-evaluation (deferred candidate)
//! Transfer     ─► PositionManager activity
//! ```
//!
//! Each candidate is evaluated as of the timestamp of the event that touched
//! it, so a recorded feed replays the same way it ran live. Deferred
//! candidates are dropped once they have waited longer than the age filter
//! allows, whether or not their feed ever moves again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::probes::{HoneypotProbe, LiquidityProbe, SellQuoteProbe, SnapshotLiquidityProbe};
use crate::filter::types::{TokenCandidate, ValidationVerdict};
use crate::filter::validator::TokenValidator;
use crate::journal::{TradeJournal, TradeRecord};
use crate::position::manager::PositionManager;
use crate::position::store::PositionStore;
use crate::strategy::engine::{Decision, DecisionEngine, DecisionStrategy, SniperStrategy};
use crate::strategy::portfolio_risk::RiskLedger;
use crate::stream::events::{ChainEvent, EventSource, MarketDataProvider};
use crate::trading::executor::{buy_with_retry, retry_execution, Executor, Receipt, RetryPolicy};

/// Counters for one run of the event loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub events: u64,
    pub tokens_created: u64,
    pub evaluations: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub deferred: u64,
    /// Deferred candidates given up on after too many attempts
    pub defers_expired: u64,
    pub skipped: u64,
    pub entries: u64,
    pub entries_failed: u64,
    pub ticks_routed: u64,
}

/// A candidate waiting for re-evaluation
#[derive(Debug, Clone, Copy)]
struct DeferredEntry {
    attempts: u32,
    first_deferred: DateTime<Utc>,
}

/// How often, in event time, the defer queue is swept for stale entries
const DEFER_SWEEP_INTERVAL_SECS: i64 = 60;

/// Orchestrates validation, entry and position monitoring
pub struct Sniper {
    config: Arc<Config>,
    market: Arc<dyn MarketDataProvider>,
    executor: Arc<dyn Executor>,
    validator: TokenValidator,
    engine: DecisionEngine,
    ledger: Arc<RiskLedger>,
    positions: PositionManager,
    journal: Arc<TradeJournal>,
    entry_policy: RetryPolicy,
    deferred: HashMap<String, DeferredEntry>,
    next_defer_sweep: Option<DateTime<Utc>>,
    stats: RunStats,
}

impl Sniper {
    /// Build with the snapshot-based liquidity and sell-quote probes
    pub fn new(
        config: Arc<Config>,
        market: Arc<dyn MarketDataProvider>,
        executor: Arc<dyn Executor>,
        journal: Arc<TradeJournal>,
    ) -> Result<Self> {
        let liquidity = Arc::new(SnapshotLiquidityProbe::new(config.probes.min_liquidity_usd));
        let honeypot = Arc::new(SellQuoteProbe::new());
        Self::with_probes(config, market, executor, journal, liquidity, honeypot)
    }

    pub fn with_probes(
        config: Arc<Config>,
        market: Arc<dyn MarketDataProvider>,
        executor: Arc<dyn Executor>,
        journal: Arc<TradeJournal>,
        liquidity: Arc<dyn LiquidityProbe>,
        honeypot: Arc<dyn HoneypotProbe>,
    ) -> Result<Self> {
        let validator = TokenValidator::new(&config, liquidity, honeypot)?;
        let ledger = Arc::new(RiskLedger::new(&config.risk));
        let engine = DecisionEngine::new(Box::new(SniperStrategy), ledger.clone(), config.clone());
        let positions = PositionManager::new(&config, executor.clone(), ledger.clone(), journal.clone());

        info!(
            filters = ?validator.filter_names(),
            max_concurrent = config.risk.max_concurrent_positions,
            max_position = %ledger.max_position_size(),
            "Sniper pipeline ready"
        );

        Ok(Self {
            entry_policy: RetryPolicy::entry(&config.execution),
            config,
            market,
            executor,
            validator,
            engine,
            ledger,
            positions,
            journal,
            deferred: HashMap::new(),
            next_defer_sweep: None,
            stats: RunStats::default(),
        })
    }

    /// Swap the buy-decision strategy
    pub fn with_strategy(mut self, strategy: Box<dyn DecisionStrategy>) -> Self {
        self.engine = DecisionEngine::new(strategy, self.ledger.clone(), self.config.clone());
        self
    }

    /// Persist open positions through `store`; call before the first event
    pub fn with_position_store(mut self, store: Arc<PositionStore>) -> Self {
        self.positions = PositionManager::new(
            &self.config,
            self.executor.clone(),
            self.ledger.clone(),
            self.journal.clone(),
        )
        .with_store(store);
        self
    }

    /// Resume monitoring of positions left open by a previous run
    pub async fn resume_positions(&self, now: DateTime<Utc>) -> usize {
        let resumed = self.positions.restore(now).await;
        if resumed > 0 {
            info!(resumed = resumed, "Resumed open positions");
        }
        resumed
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn ledger(&self) -> &Arc<RiskLedger> {
        &self.ledger
    }

    pub fn journal(&self) -> &Arc<TradeJournal> {
        &self.journal
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Candidates currently waiting for re-evaluation
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Consume events until the source is exhausted or `shutdown` fires
    ///
    /// Position monitors keep running afterwards; call
    /// [`PositionManager::shutdown`] to stop them.
    pub async fn run<S>(&mut self, source: &mut S, shutdown: CancellationToken) -> RunStats
    where
        S: EventSource + ?Sized,
    {
        info!("Sniper started. Listening for new tokens...");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Received shutdown signal");
                    break;
                }
                event = source.next_event() => event,
            };

            match event {
                Some(event) => self.handle_event(event).await,
                None => {
                    info!("Event source exhausted");
                    break;
                }
            }
        }

        info!(
            events = self.stats.events,
            entries = self.stats.entries,
            open_positions = self.positions.open_count(),
            deferred = self.deferred.len(),
            "Sniper stopped"
        );
        self.stats.clone()
    }

    /// Dispatch a single event
    pub async fn handle_event(&mut self, event: ChainEvent) {
        self.stats.events += 1;
        self.sweep_deferred(event.timestamp());

        match event {
            ChainEvent::TokenCreated {
                token,
                creator,
                created_at,
            } => {
                self.stats.tokens_created += 1;
                debug!(mint = %token, creator = %creator, "New token detected");
                self.consider(&token, created_at).await;
            }
            ChainEvent::PriceUpdate(tick) => {
                let token = tick.token.clone();
                let at = tick.timestamp;
                if self.positions.on_tick(tick).await {
                    self.stats.ticks_routed += 1;
                } else if self.deferred.contains_key(&token) {
                    self.consider(&token, at).await;
                }
            }
            ChainEvent::Transfer {
                token, timestamp, ..
            } => {
                if !self.positions.record_activity(&token, timestamp).await
                    && self.deferred.contains_key(&token)
                {
                    self.consider(&token, timestamp).await;
                }
            }
        }
    }

    /// Fetch, validate and possibly buy a candidate as of `now`
    async fn consider(&mut self, token: &str, now: DateTime<Utc>) {
        if self.positions.is_open(token) {
            self.deferred.remove(token);
            return;
        }

        let candidate = match self.fetch_snapshot(token).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(mint = %token, error = %e, "Snapshot unavailable, deferring");
                self.note_deferred(token, now);
                return;
            }
        };

        self.stats.evaluations += 1;
        let verdict = self.validator.evaluate_at(&candidate, now).await;

        match &verdict {
            ValidationVerdict::Accept => {
                self.stats.accepted += 1;
                self.deferred.remove(token);
            }
            ValidationVerdict::Reject(_) => {
                self.stats.rejected += 1;
                self.deferred.remove(token);
                return;
            }
            ValidationVerdict::Defer(_) => {
                self.note_deferred(token, now);
                return;
            }
        }

        match self.engine.decide_at(&candidate, &verdict, now).await {
            Decision::Buy {
                amount,
                max_slippage_bps,
                ..
            } => self.enter(&candidate, amount, max_slippage_bps, now).await,
            Decision::Skip(_) => self.stats.skipped += 1,
        }
    }

    async fn fetch_snapshot(&self, token: &str) -> Result<TokenCandidate> {
        let timeout_ms = self.config.probes.market_data_timeout_ms;
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.market.snapshot(token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::MarketDataTimeout(timeout_ms)),
        }
    }

    fn note_deferred(&mut self, token: &str, now: DateTime<Utc>) {
        self.stats.deferred += 1;
        let entry = self
            .deferred
            .entry(token.to_string())
            .or_insert(DeferredEntry {
                attempts: 0,
                first_deferred: now,
            });
        entry.attempts += 1;

        if entry.attempts > self.config.filters.max_defer_attempts {
            self.deferred.remove(token);
            self.stats.defers_expired += 1;
            info!(
                mint = %token,
                attempts = self.config.filters.max_defer_attempts,
                "Giving up on deferred candidate"
            );
        }
    }

    /// Drop deferred candidates that have waited longer than `filters.max_age_minutes`
    fn sweep_deferred(&mut self, now: DateTime<Utc>) {
        if self.deferred.is_empty() {
            return;
        }
        if self.next_defer_sweep.is_some_and(|next| now < next) {
            return;
        }
        self.next_defer_sweep = Some(now + chrono::Duration::seconds(DEFER_SWEEP_INTERVAL_SECS));

        let max_wait = chrono::Duration::minutes(self.config.filters.max_age_minutes as i64);
        let before = self.deferred.len();
        self.deferred
            .retain(|_, entry| now - entry.first_deferred <= max_wait);

        let expired = before - self.deferred.len();
        if expired > 0 {
            self.stats.defers_expired += expired as u64;
            debug!(
                expired = expired,
                waiting = self.deferred.len(),
                "Dropped stale deferred candidates"
            );
        }
    }

    /// Submit the entry; the ledger slot is already reserved
    async fn enter(
        &mut self,
        candidate: &TokenCandidate,
        amount: f64,
        max_slippage_bps: u32,
        now: DateTime<Utc>,
    ) {
        let token = candidate.token.as_str();

        let receipt = match buy_with_retry(
            self.executor.as_ref(),
            &self.entry_policy,
            token,
            amount,
            max_slippage_bps,
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(_) => {
                self.ledger.cancel_reservation(token).await;
                self.stats.entries_failed += 1;
                return;
            }
        };

        if let Err(e) = self
            .positions
            .open(token, candidate.market_cap, amount, now)
        {
            error!(
                mint = %token,
                signature = %receipt.signature,
                error = %e,
                "Bought but could not track position"
            );
            self.ledger.cancel_reservation(token).await;
            self.stats.entries_failed += 1;
            return;
        }

        self.journal
            .record(TradeRecord::buy(
                token,
                receipt.base_amount.unwrap_or(amount),
                &receipt.signature,
                now,
            ))
            .await;
        self.stats.entries += 1;

        info!(
            mint = %token,
            amount = %amount,
            entry_mcap = %candidate.market_cap,
            signature = %receipt.signature,
            "BUY executed"
        );
    }

    /// Forward an atomic two-pool arbitrage to the executor
    ///
    /// Opaque to the core: nothing is reserved, tracked or journaled.
    pub async fn submit_arbitrage(
        &self,
        pair_a: &str,
        pair_b: &str,
        token: &str,
        amount: f64,
    ) -> Result<Receipt> {
        let executor = self.executor.as_ref();
        retry_execution(&self.entry_policy, "arbitrage", token, move || {
            executor.arbitrage(pair_a, pair_b, token, amount)
        })
        .await
        .map_err(|(e, attempts)| {
            warn!(mint = %token, attempts = attempts, error = %e, "Arbitrage failed");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::types::test_support::healthy_candidate;
    use crate::stream::replay::InMemoryMarketData;
    use crate::trading::simulation::{ExecutionCall, PaperExecutor};

    struct Harness {
        sniper: Sniper,
        market: Arc<InMemoryMarketData>,
        executor: Arc<PaperExecutor>,
    }

    fn harness(config: Config) -> Harness {
        let market = Arc::new(InMemoryMarketData::new());
        let executor = Arc::new(PaperExecutor::new());
        let sniper = Sniper::new(
            Arc::new(config),
            market.clone(),
            executor.clone(),
            Arc::new(TradeJournal::in_memory()),
        )
        .unwrap();
        Harness {
            sniper,
            market,
            executor,
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.exits.check_interval_ms = 0;
        config.execution.entry_retry_base_ms = 1;
        config
    }

    fn created(token: &str, at: DateTime<Utc>) -> ChainEvent {
        ChainEvent::TokenCreated {
            token: token.to_string(),
            creator: "dev".to_string(),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_accepted_candidate_is_bought() {
        let mut h = harness(test_config());
        let now = Utc::now();
        h.market.upsert(healthy_candidate("tok", now));

        h.sniper.handle_event(created("tok", now)).await;

        assert!(h.sniper.positions().is_open("tok"));
        assert_eq!(h.sniper.stats().entries, 1);
        assert!(h.sniper.ledger().holds("tok").await);
        assert_eq!(h.sniper.journal().records().await.len(), 1);
        assert!(matches!(
            h.executor.filled().await[0].call,
            ExecutionCall::Buy { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_snapshot_defers() {
        let mut h = harness(test_config());
        h.sniper.handle_event(created("ghost", Utc::now())).await;

        assert_eq!(h.sniper.deferred_count(), 1);
        assert_eq!(h.sniper.stats().evaluations, 0);
        assert!(h.executor.filled().await.is_empty());
    }

    #[tokio::test]
    async fn test_low_mcap_defers_then_buys_on_price_update() {
        let mut h = harness(test_config());
        let now = Utc::now();
        let mut candidate = healthy_candidate("tok", now);
        candidate.market_cap = 10_000.0;
        h.market.upsert(candidate.clone());

        h.sniper.handle_event(created("tok", now)).await;
        assert_eq!(h.sniper.deferred_count(), 1);
        assert!(!h.sniper.positions().is_open("tok"));

        candidate.market_cap = 18_000.0;
        h.market.upsert(candidate);
        h.sniper
            .handle_event(ChainEvent::PriceUpdate(crate::stream::events::MarketTick {
                token: "tok".into(),
                timestamp: now + chrono::Duration::seconds(30),
                market_cap: 18_000.0,
                volume: 1.0,
            }))
            .await;

        assert_eq!(h.sniper.deferred_count(), 0);
        assert!(h.sniper.positions().is_open("tok"));
        assert_eq!(h.sniper.positions().snapshot("tok").unwrap().entry_mcap, 18_000.0);
    }

    #[tokio::test]
    async fn test_defer_gives_up_after_max_attempts() {
        let mut config = test_config();
        config.filters.max_defer_attempts = 2;
        let mut h = harness(config);

        for _ in 0..3 {
            h.sniper.handle_event(created("ghost", Utc::now())).await;
        }
        assert_eq!(h.sniper.deferred_count(), 0);
        assert_eq!(h.sniper.stats().defers_expired, 1);
    }

    #[tokio::test]
    async fn test_stale_deferred_candidates_are_dropped() {
        let mut h = harness(test_config());
        let t0 = Utc::now();

        for i in 0..1000 {
            let token = format!("early{}", i);
            let mut candidate = healthy_candidate(&token, t0);
            candidate.market_cap = 10_000.0;
            h.market.upsert(candidate);
            h.sniper.handle_event(created(&token, t0)).await;
        }
        assert_eq!(h.sniper.deferred_count(), 1000);

        // Still inside the age window: nothing is dropped
        h.sniper
            .handle_event(created("ghost", t0 + chrono::Duration::minutes(20)))
            .await;
        assert_eq!(h.sniper.deferred_count(), 1001);

        // An unrelated event a day later sweeps them all
        h.sniper
            .handle_event(created("late", t0 + chrono::Duration::days(1)))
            .await;
        assert_eq!(h.sniper.deferred_count(), 1);
        assert_eq!(h.sniper.stats().defers_expired, 1001);
    }

    #[tokio::test]
    async fn test_non_finite_snapshot_never_enters() {
        let mut h = harness(test_config());
        let now = Utc::now();
        let mut candidate = healthy_candidate("tok", now);
        candidate.market_cap = f64::NAN;
        h.market.upsert(candidate);

        h.sniper.handle_event(created("tok", now)).await;

        assert_eq!(h.sniper.stats().rejected, 1);
        assert_eq!(h.sniper.deferred_count(), 0);
        assert!(!h.sniper.positions().is_open("tok"));
        assert_eq!(h.executor.buy_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_entry_releases_reservation() {
        let mut h = harness(test_config());
        let now = Utc::now();
        h.market.upsert(healthy_candidate("tok", now));
        h.executor.fail_next_buys(10);

        h.sniper.handle_event(created("tok", now)).await;

        assert_eq!(h.sniper.stats().entries_failed, 1);
        assert!(!h.sniper.positions().is_open("tok"));
        assert_eq!(h.sniper.ledger().open_positions().await, 0);
        assert!(h.sniper.journal().records().await.is_empty());
    }

    #[tokio::test]
    async fn test_arbitrage_passthrough() {
        let h = harness(test_config());
        let receipt = h
            .sniper
            .submit_arbitrage("poolA", "poolB", "tok", 3.0)
            .await
            .unwrap();

        assert!(receipt.signature.starts_with("paper-"));
        assert!(h.sniper.journal().records().await.is_empty());
        assert_eq!(h.sniper.ledger().open_positions().await, 0);
    }
}
