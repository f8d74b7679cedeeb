//! Position management
//!
//! Registry of open positions, one monitor task each. Ticks for a token are
//! routed to its task; nothing here mutates a position directly. With a
//! file-backed [`PositionStore`], positions left open by a previous run are
//! resumed through [`PositionManager::restore`].

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::journal::TradeJournal;
use crate::strategy::portfolio_risk::RiskLedger;
use crate::stream::events::MarketTick;
use crate::trading::executor::{Executor, RetryPolicy};

use super::exit_rules::{ExitRules, Position, PositionSnapshot};
use super::monitor::{run_monitor, MonitorContext, PositionCommand, PositionHandle};
use super::store::PositionStore;

/// Position manager
pub struct PositionManager {
    rules: ExitRules,
    command_buffer: usize,
    ctx: MonitorContext,
    shutdown: CancellationToken,
}

impl PositionManager {
    pub fn new(
        config: &Config,
        executor: Arc<dyn Executor>,
        ledger: Arc<RiskLedger>,
        journal: Arc<TradeJournal>,
    ) -> Self {
        let check_interval = match config.exits.check_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            rules: ExitRules::from_config(&config.exits),
            command_buffer: config.execution.command_buffer,
            ctx: MonitorContext {
                executor,
                ledger,
                journal,
                store: Arc::new(PositionStore::in_memory()),
                exit_policy: RetryPolicy::exit(&config.execution),
                exit_slippage_bps: config.execution.exit_slippage_bps,
                check_interval,
                open: Arc::new(DashMap::new()),
                closed: Arc::new(DashMap::new()),
            },
            shutdown: CancellationToken::new(),
        }
    }

    /// Persist open positions through `store`; set before any position is opened
    pub fn with_store(mut self, store: Arc<PositionStore>) -> Self {
        self.ctx.store = store;
        self
    }

    pub fn store(&self) -> &Arc<PositionStore> {
        &self.ctx.store
    }

    /// Start tracking a filled entry; its ledger slot must already be held
    pub fn open(
        &self,
        token: &str,
        entry_mcap: f64,
        amount: f64,
        entry_time: DateTime<Utc>,
    ) -> Result<()> {
        if self.ctx.open.contains_key(token) {
            return Err(Error::Internal(format!("position already open for {}", token)));
        }
        if !entry_mcap.is_finite() || entry_mcap <= 0.0 {
            return Err(Error::Internal(format!(
                "invalid entry market cap {} for {}",
                entry_mcap, token
            )));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::Internal(format!(
                "invalid position amount {} for {}",
                amount, token
            )));
        }

        let position = Position::open(token, entry_mcap, amount, entry_time, self.rules.clone());
        self.spawn(position);

        info!(
            mint = %token,
            entry_mcap = %entry_mcap,
            amount = %amount,
            "Position opened"
        );
        Ok(())
    }

    /// Resume every position the store holds, re-taking its ledger slot
    ///
    /// Returns how many monitors were started.
    pub async fn restore(&self, resumed_at: DateTime<Utc>) -> usize {
        let mut resumed = 0;
        for record in self.ctx.store.records().await {
            let token = record.token.clone();
            if self.ctx.open.contains_key(&token) {
                continue;
            }
            if !record.entry_mcap.is_finite() || record.entry_mcap <= 0.0 {
                warn!(
                    mint = %token,
                    entry_mcap = %record.entry_mcap,
                    "Dropping unusable stored position"
                );
                self.ctx.store.remove(&token).await;
                continue;
            }

            self.ctx.ledger.restore(&token, record.amount).await;
            let position = Position::restore(record, self.rules.clone(), resumed_at);
            info!(
                mint = %token,
                state = ?position.state(),
                sold_fraction = %position.sold_fraction(),
                "Position resumed"
            );
            self.spawn(position);
            resumed += 1;
        }
        resumed
    }

    fn spawn(&self, position: Position) {
        let token = position.token().to_string();
        let (tx, rx) = mpsc::channel(self.command_buffer);
        let (snapshot_tx, snapshot_rx) = watch::channel(position.snapshot());
        let cancel = self.shutdown.child_token();

        self.ctx.open.insert(
            token.clone(),
            PositionHandle {
                tx,
                cancel: cancel.clone(),
                snapshot: snapshot_rx,
            },
        );
        self.ctx.closed.remove(&token);

        tokio::spawn(run_monitor(
            position,
            rx,
            snapshot_tx,
            cancel,
            self.ctx.clone(),
        ));
    }

    fn sender(&self, token: &str) -> Option<mpsc::Sender<PositionCommand>> {
        self.ctx.open.get(token).map(|h| h.tx.clone())
    }

    async fn send(&self, token: &str, command: PositionCommand) -> bool {
        match self.sender(token) {
            Some(tx) => tx.send(command).await.is_ok(),
            None => false,
        }
    }

    /// Route a market tick; false if no position is open for the token
    pub async fn on_tick(&self, tick: MarketTick) -> bool {
        let token = tick.token.clone();
        self.send(&token, PositionCommand::Tick(tick)).await
    }

    /// Route trade activity so the no-volume timer is refreshed
    pub async fn record_activity(&self, token: &str, at: DateTime<Utc>) -> bool {
        self.send(token, PositionCommand::Activity(at)).await
    }

    /// Sell everything that remains with reason `Manual`
    pub async fn force_exit(&self, token: &str) -> Result<()> {
        if self.send(token, PositionCommand::ForceExit).await {
            info!(mint = %token, "Manual exit requested");
            Ok(())
        } else {
            Err(Error::PositionNotFound(token.to_string()))
        }
    }

    /// Panic sell every open position
    pub async fn force_exit_all(&self) -> usize {
        let tokens: Vec<String> = self.ctx.open.iter().map(|e| e.key().clone()).collect();
        let mut requested = 0;
        for token in tokens {
            if self.force_exit(&token).await.is_ok() {
                requested += 1;
            }
        }
        requested
    }

    /// Wait until every open monitor has drained the commands already sent to it
    pub async fn settle(&self) {
        let senders: Vec<_> = self.ctx.open.iter().map(|h| h.tx.clone()).collect();
        join_all(senders.into_iter().map(|tx| async move {
            let (reply, done) = oneshot::channel();
            if tx.send(PositionCommand::Flush(reply)).await.is_ok() {
                let _ = done.await;
            }
        }))
        .await;
    }

    pub fn is_open(&self, token: &str) -> bool {
        self.ctx.open.contains_key(token)
    }

    pub fn open_count(&self) -> usize {
        self.ctx.open.len()
    }

    pub fn snapshot(&self, token: &str) -> Option<PositionSnapshot> {
        if let Some(handle) = self.ctx.open.get(token) {
            return Some(handle.snapshot.borrow().clone());
        }
        self.ctx.closed.get(token).map(|s| s.value().clone())
    }

    pub fn open_positions(&self) -> Vec<PositionSnapshot> {
        self.ctx
            .open
            .iter()
            .map(|h| h.snapshot.borrow().clone())
            .collect()
    }

    pub fn closed_positions(&self) -> Vec<PositionSnapshot> {
        self.ctx.closed.iter().map(|s| s.value().clone()).collect()
    }

    /// Watch a position's published state
    pub fn subscribe(&self, token: &str) -> Option<watch::Receiver<PositionSnapshot>> {
        self.ctx.open.get(token).map(|h| h.snapshot.clone())
    }

    /// Wait until the position reaches a terminal state
    pub async fn wait_closed(&self, token: &str) -> Option<PositionSnapshot> {
        if let Some(mut rx) = self.subscribe(token) {
            if let Ok(snapshot) = rx.wait_for(|s| s.state.is_terminal()).await {
                return Some(snapshot.clone());
            }
        }
        self.ctx.closed.get(token).map(|s| s.value().clone())
    }

    /// Stop every monitor task; open positions stay open in the ledger
    pub fn shutdown(&self) {
        debug!(open = self.open_count(), "Stopping position monitors");
        for handle in self.ctx.open.iter() {
            handle.cancel.cancel();
        }
        self.shutdown.cancel();
    }
}

impl Drop for PositionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeProfitLevel;
    use crate::journal::TradeSide;
    use crate::position::exit_rules::{ExitReason, PositionState};
    use crate::trading::simulation::{ExecutionCall, PaperExecutor};
    use chrono::Duration as ChronoDuration;

    struct Fixture {
        manager: PositionManager,
        executor: Arc<PaperExecutor>,
        ledger: Arc<RiskLedger>,
        journal: Arc<TradeJournal>,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(PositionStore::in_memory()))
    }

    fn fixture_with(store: Arc<PositionStore>) -> Fixture {
        let mut config = Config::default();
        config.exits.hard_stop_loss_pct = -30.0;
        config.exits.migration_mcap = 10_000_000.0;
        config.exits.check_interval_ms = 0;
        config.exits.take_profit_targets = vec![
            TakeProfitLevel::multiple(2.5, 0.5),
            TakeProfitLevel::multiple(5.0, 1.0),
        ];
        config.execution.exit_retry_attempts = 3;
        config.execution.exit_retry_base_ms = 1;
        config.execution.exit_retry_max_ms = 2;

        let executor = Arc::new(PaperExecutor::new());
        let ledger = Arc::new(RiskLedger::new(&config.risk));
        let journal = Arc::new(TradeJournal::in_memory());
        let manager = PositionManager::new(&config, executor.clone(), ledger.clone(), journal.clone())
            .with_store(store);
        Fixture {
            manager,
            executor,
            ledger,
            journal,
        }
    }

    fn tick(token: &str, at: DateTime<Utc>, mcap: f64) -> MarketTick {
        MarketTick {
            token: token.to_string(),
            timestamp: at,
            market_cap: mcap,
            volume: 1.0,
        }
    }

    async fn open(f: &Fixture, token: &str, entry_mcap: f64, at: DateTime<Utc>) {
        f.ledger.try_reserve(token, 1.0, Utc::now()).await.unwrap();
        f.manager.open(token, entry_mcap, 1.0, at).unwrap();
    }

    #[tokio::test]
    async fn test_hard_stop_closes_and_releases_slot() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "tok", 50_000.0, t0).await;
        assert_eq!(f.ledger.open_positions().await, 1);

        assert!(f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(1), 34_000.0)).await);
        let closed = f.manager.wait_closed("tok").await.unwrap();

        assert_eq!(closed.state, PositionState::Closed(ExitReason::HardStop));
        assert_eq!(closed.sold_fraction, 1.0);
        assert!(!f.manager.is_open("tok"));
        assert_eq!(f.ledger.open_positions().await, 0);

        let filled = f.executor.filled().await;
        assert_eq!(filled.len(), 1);
        assert!(matches!(
            filled[0].call,
            ExecutionCall::Sell { fraction, .. } if fraction == 1.0
        ));

        // Loss of 32% on 1.0 counts toward the daily ceiling
        let snap = f.ledger.snapshot(t0).await;
        assert!((snap.daily_loss - 0.32).abs() < 1e-9);

        // Journaled at the time of the tick that triggered the sell
        let records = f.journal.records().await;
        assert_eq!(records[0].timestamp, t0 + ChronoDuration::seconds(1));
    }

    #[tokio::test]
    async fn test_ladder_through_manager() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "tok", 50_000.0, t0).await;

        f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(1), 125_000.0)).await;
        // Same tick again must not sell twice
        f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(1), 125_000.0)).await;
        f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(2), 250_000.0)).await;

        let closed = f.manager.wait_closed("tok").await.unwrap();
        assert_eq!(closed.state, PositionState::Closed(ExitReason::TakeProfit));

        let sells: Vec<_> = f
            .journal
            .records()
            .await
            .into_iter()
            .filter(|r| r.side == TradeSide::Sell)
            .collect();
        assert_eq!(sells.len(), 2);
        assert_eq!(sells[0].fraction, Some(0.5));
        assert_eq!(sells[1].fraction, Some(0.5));

        let calls = f.executor.filled().await;
        assert!(matches!(
            calls[0].call,
            ExecutionCall::Sell { fraction, .. } if fraction == 0.5
        ));
        assert!(matches!(
            calls[1].call,
            ExecutionCall::Sell { fraction, .. } if fraction == 1.0
        ));
    }

    #[tokio::test]
    async fn test_failed_exit_keeps_position_open() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "tok", 50_000.0, t0).await;
        f.executor.fail_next_sells(3);

        let mut rx = f.manager.subscribe("tok").unwrap();
        f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(1), 30_000.0)).await;
        rx.changed().await.unwrap();

        let snap = rx.borrow().clone();
        assert_eq!(snap.state, PositionState::Open);
        assert_eq!(snap.sold_fraction, 0.0);
        assert_eq!(snap.last_mcap, 30_000.0);
        assert_eq!(f.executor.sell_attempts(), 3);
        assert_eq!(f.ledger.open_positions().await, 1);

        // Next tick re-evaluates and the sell goes through
        f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(2), 29_000.0)).await;
        let closed = f.manager.wait_closed("tok").await.unwrap();
        assert_eq!(closed.state, PositionState::Closed(ExitReason::HardStop));
    }

    #[tokio::test]
    async fn test_force_exit() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "tok", 50_000.0, t0).await;

        f.manager.force_exit("tok").await.unwrap();
        let closed = f.manager.wait_closed("tok").await.unwrap();
        assert_eq!(closed.state, PositionState::Closed(ExitReason::Manual));
        assert!(matches!(
            f.manager.force_exit("tok").await,
            Err(Error::PositionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_force_exit_all() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "a", 50_000.0, t0).await;
        open(&f, "b", 80_000.0, t0).await;

        assert_eq!(f.manager.force_exit_all().await, 2);
        for token in ["a", "b"] {
            let closed = f.manager.wait_closed(token).await.unwrap();
            assert_eq!(closed.state, PositionState::Closed(ExitReason::Manual));
        }
        assert_eq!(f.manager.open_count(), 0);
        assert_eq!(f.manager.closed_positions().len(), 2);
    }

    #[tokio::test]
    async fn test_settle_drains_queued_ticks() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "tok", 50_000.0, t0).await;

        for i in 1..=5 {
            let mcap = 50_000.0 + i as f64 * 1_000.0;
            f.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(i), mcap)).await;
        }
        f.manager.settle().await;

        let snap = f.manager.snapshot("tok").unwrap();
        assert_eq!(snap.last_mcap, 55_000.0);
        assert_eq!(snap.highest_mcap_seen, 55_000.0);
        assert_eq!(snap.state, PositionState::Open);
    }

    #[tokio::test]
    async fn test_ticks_for_unknown_token_ignored() {
        let f = fixture();
        assert!(!f.manager.on_tick(tick("nope", Utc::now(), 1.0)).await);
    }

    #[tokio::test]
    async fn test_non_finite_entry_rejected() {
        let f = fixture();
        let t0 = Utc::now();
        assert!(f.manager.open("tok", f64::NAN, 1.0, t0).is_err());
        assert!(f.manager.open("tok", f64::INFINITY, 1.0, t0).is_err());
        assert!(f.manager.open("tok", 50_000.0, f64::NAN, t0).is_err());
        assert!(!f.manager.is_open("tok"));
        assert!(f.manager.snapshot("tok").is_none());
    }

    #[tokio::test]
    async fn test_open_positions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions.json");
        let t0 = Utc::now();

        let first = fixture_with(Arc::new(PositionStore::load(&path).await.unwrap()));
        open(&first, "tok", 50_000.0, t0).await;
        open(&first, "gone", 50_000.0, t0).await;
        first.manager.on_tick(tick("tok", t0 + ChronoDuration::seconds(1), 125_000.0)).await;
        first.manager.force_exit("gone").await.unwrap();
        first.manager.wait_closed("gone").await.unwrap();
        first.manager.settle().await;
        assert_eq!(first.manager.snapshot("tok").unwrap().sold_fraction, 0.5);
        first.manager.shutdown();
        drop(first);

        // Fresh process: empty ledger, positions read back from disk
        let second = fixture_with(Arc::new(PositionStore::load(&path).await.unwrap()));
        assert_eq!(second.manager.restore(t0 + ChronoDuration::minutes(5)).await, 1);
        assert!(second.manager.is_open("tok"));
        assert!(!second.manager.is_open("gone"));
        assert!(second.ledger.holds("tok").await);

        let snap = second.manager.snapshot("tok").unwrap();
        assert_eq!(snap.state, PositionState::SecuredProfit);
        assert_eq!(snap.sold_fraction, 0.5);
        assert_eq!(snap.version, 1);
        assert_eq!(snap.highest_mcap_seen, 125_000.0);

        // The hard stop still guards the resumed position
        second
            .manager
            .on_tick(tick("tok", t0 + ChronoDuration::minutes(6), 20_000.0))
            .await;
        let closed = second.manager.wait_closed("tok").await.unwrap();
        assert_eq!(closed.state, PositionState::Closed(ExitReason::HardStop));
        assert_eq!(second.ledger.open_positions().await, 0);
        assert!(PositionStore::load(&path)
            .await
            .unwrap()
            .records()
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_open_rejected() {
        let f = fixture();
        let t0 = Utc::now();
        open(&f, "tok", 50_000.0, t0).await;
        assert!(f.manager.open("tok", 50_000.0, 1.0, t0).is_err());
        assert_eq!(f.manager.open_count(), 1);
        assert_eq!(f.manager.open_positions().len(), 1);
    }
}
