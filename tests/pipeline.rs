//! Pipeline Integration Tests
//!
//! Drives the full orchestrator end to end:
//! 1. recorded events -> validator -> decision -> paper executor -> positions
//! 2. exits driven by price updates, journaled and released from the ledger
//! 3. portfolio limits holding across candidates
//!
//! All tests are deterministic (no network) and use the paper executor.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use monad_sniper::config::Config;
use monad_sniper::filter::types::{HolderInfo, LiquiditySnapshot, TokenCandidate};
use monad_sniper::journal::{TradeJournal, TradeSide};
use monad_sniper::position::{ExitReason, PositionState, PositionStore};
use monad_sniper::stream::events::{ChainEvent, MarketTick};
use monad_sniper::stream::replay::{InMemoryMarketData, ReplayRecord, ReplaySource};
use monad_sniper::trading::simulation::{ExecutionCall, PaperExecutor};
use monad_sniper::Sniper;

// ============================================================================
// Test Fixtures
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn config() -> Config {
    let mut config = Config::default();
    config.exits.check_interval_ms = 0;
    config.execution.entry_retry_base_ms = 1;
    config.execution.exit_retry_base_ms = 1;
    config.execution.exit_retry_max_ms = 2;
    config
}

/// Candidate that passes every filter under the default config
fn candidate(token: &str, created_at: DateTime<Utc>) -> TokenCandidate {
    TokenCandidate {
        token: token.to_string(),
        name: Some(format!("{} coin", token)),
        symbol: Some(token.to_uppercase()),
        created_at,
        market_cap: 20_000.0,
        total_supply: 1_000_000_000.0,
        dev_balance: 30_000_000.0,
        liquidity: LiquiditySnapshot {
            quote_reserve_usd: 9_000.0,
            token_reserve: 400_000_000.0,
        },
        top_holders: (0..6)
            .map(|i| HolderInfo {
                address: format!("{}-holder{}", token, i),
                balance: 5_000_000.0 * (i + 1) as f64,
                funding_source: Some(format!("{}-funder{}", token, i)),
                nonce: 7,
            })
            .collect(),
    }
}

fn snapshot(candidate: TokenCandidate) -> ReplayRecord {
    ReplayRecord::Snapshot { candidate }
}

fn created(token: &str, at: DateTime<Utc>) -> ReplayRecord {
    ReplayRecord::Event {
        event: ChainEvent::TokenCreated {
            token: token.to_string(),
            creator: format!("{}-dev", token),
            created_at: at,
        },
    }
}

fn price(token: &str, at: DateTime<Utc>, market_cap: f64) -> ReplayRecord {
    ReplayRecord::Event {
        event: ChainEvent::PriceUpdate(MarketTick {
            token: token.to_string(),
            timestamp: at,
            market_cap,
            volume: 2.5,
        }),
    }
}

struct Run {
    sniper: Sniper,
    executor: Arc<PaperExecutor>,
    journal: Arc<TradeJournal>,
}

async fn run(config: Config, records: Vec<ReplayRecord>) -> Run {
    let market = Arc::new(InMemoryMarketData::new());
    let mut source = ReplaySource::new(records, market.clone());
    let executor = Arc::new(PaperExecutor::new());
    let journal = Arc::new(TradeJournal::in_memory());

    let mut sniper = Sniper::new(Arc::new(config), market, executor.clone(), journal.clone())
        .expect("pipeline builds");
    sniper.run(&mut source, CancellationToken::new()).await;
    sniper.positions().settle().await;

    Run {
        sniper,
        executor,
        journal,
    }
}

// ============================================================================
// End-to-end flows
// ============================================================================

#[tokio::test]
async fn test_take_profit_ladder_end_to_end() {
    let t = t0();
    let records = vec![
        snapshot(candidate("good", t)),
        created("good", t),
        price("good", t + Duration::seconds(10), 30_000.0),
        // 2.5x: sell half
        price("good", t + Duration::seconds(20), 50_000.0),
        // Duplicate delivery
        price("good", t + Duration::seconds(20), 50_000.0),
        price("good", t + Duration::seconds(30), 45_000.0),
        // 5x: sell the rest
        price("good", t + Duration::seconds(40), 100_000.0),
    ];

    let r = run(config(), records).await;

    let closed = r.sniper.positions().wait_closed("good").await.unwrap();
    assert_eq!(closed.state, PositionState::Closed(ExitReason::TakeProfit));
    assert_eq!(closed.entry_mcap, 20_000.0);
    assert_eq!(closed.highest_mcap_seen, 100_000.0);

    let trades = r.journal.records().await;
    let sides: Vec<TradeSide> = trades.iter().map(|t| t.side).collect();
    assert_eq!(sides, vec![TradeSide::Buy, TradeSide::Sell, TradeSide::Sell]);
    assert_eq!(trades[0].timestamp, t);
    // Sells carry the recorded time of the tick that triggered them
    assert_eq!(trades[1].timestamp, t + Duration::seconds(20));
    assert_eq!(trades[2].timestamp, t + Duration::seconds(40));

    let summary = r.journal.summary().await;
    // 5.0 in; half out at 2.5x, half at 5x
    assert!((summary.total_sold - 18.75).abs() < 1e-9);
    assert!((summary.realized_pnl - 13.75).abs() < 1e-9);
    assert_eq!(summary.winning_sells, 2);

    assert_eq!(r.sniper.ledger().open_positions().await, 0);
    assert_eq!(r.sniper.stats().entries, 1);
}

#[tokio::test]
async fn test_rejections_and_hard_stop() {
    let t = t0();

    let old = candidate("old", t - Duration::hours(2));

    let mut bundled = candidate("bundle", t);
    for holder in bundled.top_holders.iter_mut().take(3) {
        holder.funding_source = Some("cex-hot-wallet".to_string());
    }

    let mut dev_heavy = candidate("devheavy", t);
    dev_heavy.dev_balance = 150_000_000.0;

    let records = vec![
        snapshot(old),
        created("old", t),
        snapshot(bundled),
        created("bundle", t),
        snapshot(dev_heavy),
        created("devheavy", t),
        snapshot(candidate("dumped", t)),
        created("dumped", t),
        price("dumped", t + Duration::seconds(5), 21_000.0),
        // Below entry * 0.6
        price("dumped", t + Duration::seconds(9), 11_000.0),
        price("dumped", t + Duration::seconds(12), 9_000.0),
    ];

    let r = run(config(), records).await;

    let stats = r.sniper.stats();
    assert_eq!(stats.tokens_created, 4);
    assert_eq!(stats.rejected, 3);
    assert_eq!(stats.entries, 1);

    let closed = r.sniper.positions().wait_closed("dumped").await.unwrap();
    assert_eq!(closed.state, PositionState::Closed(ExitReason::HardStop));
    assert_eq!(closed.sold_fraction, 1.0);

    // One buy, one full sell; the tick after the close is not routed anywhere
    let calls = r.executor.filled().await;
    assert_eq!(calls.len(), 2);
    assert!(matches!(
        &calls[1].call,
        ExecutionCall::Sell { token, fraction, .. } if token == "dumped" && *fraction == 1.0
    ));

    // Loss accounting follows the recorded day
    let ledger = r.sniper.ledger().snapshot(t + Duration::seconds(12)).await;
    assert_eq!(ledger.open_positions, 0);
    assert!((ledger.daily_loss - 2.25).abs() < 1e-9);

    let next_day = r.sniper.ledger().snapshot(t + Duration::days(1)).await;
    assert_eq!(next_day.daily_loss, 0.0);
}

#[tokio::test]
async fn test_max_concurrent_positions_respected() {
    let t = t0();
    let mut config = config();
    config.risk.max_concurrent_positions = 2;

    let mut records = Vec::new();
    for token in ["a", "b", "c", "d"] {
        records.push(snapshot(candidate(token, t)));
        records.push(created(token, t));
    }

    let r = run(config, records).await;

    assert_eq!(r.sniper.stats().accepted, 4);
    assert_eq!(r.sniper.stats().entries, 2);
    assert_eq!(r.sniper.stats().skipped, 2);
    assert_eq!(r.sniper.positions().open_count(), 2);
    assert_eq!(r.sniper.ledger().open_positions().await, 2);
    assert_eq!(r.executor.buy_attempts(), 2);
}

#[tokio::test]
async fn test_deferred_candidate_enters_when_band_reached() {
    let t = t0();
    let mut early = candidate("early", t);
    early.market_cap = 8_000.0;

    let records = vec![
        snapshot(early),
        created("early", t),
        price("early", t + Duration::seconds(30), 12_000.0),
        price("early", t + Duration::seconds(60), 16_500.0),
    ];

    let r = run(config(), records).await;

    assert_eq!(r.sniper.stats().deferred, 2);
    assert_eq!(r.sniper.stats().entries, 1);
    let snap = r.sniper.positions().snapshot("early").unwrap();
    assert_eq!(snap.entry_mcap, 16_500.0);
    assert_eq!(snap.entry_time, t + Duration::seconds(60));
    assert_eq!(snap.state, PositionState::Open);
}

#[tokio::test]
async fn test_open_position_resumed_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("positions.json");
    let t = t0();

    let first = {
        let market = Arc::new(InMemoryMarketData::new());
        let mut source = ReplaySource::new(
            vec![
                snapshot(candidate("keep", t)),
                created("keep", t),
                price("keep", t + Duration::seconds(10), 28_000.0),
            ],
            market.clone(),
        );
        let mut sniper = Sniper::new(
            Arc::new(config()),
            market,
            Arc::new(PaperExecutor::new()),
            Arc::new(TradeJournal::in_memory()),
        )
        .unwrap()
        .with_position_store(Arc::new(PositionStore::load(&path).await.unwrap()));
        sniper.run(&mut source, CancellationToken::new()).await;
        sniper.positions().settle().await;
        sniper.positions().shutdown();
        sniper.stats().entries
    };
    assert_eq!(first, 1);

    // Restart: the position is picked up again and its hard stop still fires
    let market = Arc::new(InMemoryMarketData::new());
    let mut source = ReplaySource::new(
        vec![price("keep", t + Duration::seconds(40), 10_000.0)],
        market.clone(),
    );
    let executor = Arc::new(PaperExecutor::new());
    let mut sniper = Sniper::new(
        Arc::new(config()),
        market,
        executor.clone(),
        Arc::new(TradeJournal::in_memory()),
    )
    .unwrap()
    .with_position_store(Arc::new(PositionStore::load(&path).await.unwrap()));

    assert_eq!(sniper.resume_positions(t + Duration::seconds(30)).await, 1);
    assert_eq!(sniper.ledger().open_positions().await, 1);

    sniper.run(&mut source, CancellationToken::new()).await;
    let closed = sniper.positions().wait_closed("keep").await.unwrap();
    assert_eq!(closed.state, PositionState::Closed(ExitReason::HardStop));
    assert_eq!(closed.entry_mcap, 20_000.0);
    assert_eq!(closed.highest_mcap_seen, 28_000.0);
    assert_eq!(executor.buy_attempts(), 0);
    assert_eq!(sniper.ledger().open_positions().await, 0);
}

#[tokio::test]
async fn test_replay_from_json_lines() {
    let input = r#"
# one healthy launch
{"record":"snapshot","candidate":{"token":"0xfeed","name":"Feed","symbol":"FEED","created_at":"2026-03-01T12:00:00Z","market_cap":21000.0,"total_supply":1000000000.0,"dev_balance":10000000.0,"liquidity":{"quote_reserve_usd":7000.0,"token_reserve":300000000.0},"top_holders":[{"address":"h1","balance":10.0,"funding_source":"f1","nonce":3},{"address":"h2","balance":20.0,"funding_source":"f2","nonce":4}]}}
{"record":"event","event":{"type":"token_created","token":"0xfeed","creator":"dev","created_at":"2026-03-01T12:00:00Z"}}
{"record":"event","event":{"type":"transfer","token":"0xfeed","from":"h1","to":"h3","amount":1.0,"timestamp":"2026-03-01T12:00:05Z"}}
{"record":"event","event":{"type":"price_update","token":"0xfeed","timestamp":"2026-03-01T12:00:10Z","market_cap":26000.0,"volume":1.0}}
"#;

    let market = Arc::new(InMemoryMarketData::new());
    let mut source = ReplaySource::parse(input, market.clone()).unwrap();
    assert_eq!(source.remaining(), 4);

    let executor = Arc::new(PaperExecutor::new());
    let journal = Arc::new(TradeJournal::in_memory());
    let mut sniper =
        Sniper::new(Arc::new(config()), market, executor.clone(), journal.clone()).unwrap();

    let stats = sniper.run(&mut source, CancellationToken::new()).await;
    sniper.positions().settle().await;

    assert_eq!(stats.events, 3);
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.ticks_routed, 1);

    let snap = sniper.positions().snapshot("0xfeed").unwrap();
    assert_eq!(snap.last_mcap, 26_000.0);
    assert_eq!(snap.state, PositionState::Open);

    sniper.positions().shutdown();
}

#[tokio::test]
async fn test_shutdown_stops_event_loop() {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<ChainEvent>(8);
    let market = Arc::new(InMemoryMarketData::new());
    let mut sniper = Sniper::new(
        Arc::new(config()),
        market,
        Arc::new(PaperExecutor::new()),
        Arc::new(TradeJournal::in_memory()),
    )
    .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let stats = sniper.run(&mut rx, shutdown).await;

    assert_eq!(stats.events, 0);
    drop(tx);
}
