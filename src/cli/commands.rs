//! CLI command implementations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::filter::bundled_detection::FundingGraphAnalyzer;
use crate::filter::probes::{SellQuoteProbe, SnapshotLiquidityProbe};
use crate::filter::types::TokenCandidate;
use crate::filter::validator::TokenValidator;
use crate::journal::TradeJournal;
use crate::pipeline::Sniper;
use crate::position::store::PositionStore;
use crate::strategy::engine::{DecisionEngine, SniperStrategy};
use crate::strategy::portfolio_risk::RiskLedger;
use crate::stream::replay::{InMemoryMarketData, ReplaySource};
use crate::trading::simulation::PaperExecutor;

async fn open_journal(config: &Config) -> Result<Arc<TradeJournal>> {
    let journal = match &config.journal.path {
        Some(path) => TradeJournal::load(path)
            .await
            .with_context(|| format!("Failed to load trade journal {}", path))?,
        None => TradeJournal::in_memory(),
    };
    Ok(Arc::new(journal))
}

/// Run the whole pipeline over a JSON-lines recording with the paper executor
pub async fn replay(config: &Config, events: &Path) -> Result<()> {
    warn!("Running in DRY-RUN mode - no real trades will be executed");

    // Recorded timestamps are historical; only ticks drive exits
    let mut config = config.clone();
    config.exits.check_interval_ms = 0;
    let config = Arc::new(config);

    let market = Arc::new(InMemoryMarketData::new());
    let mut source = ReplaySource::from_file(events, market.clone())
        .await
        .with_context(|| format!("Failed to load replay file {}", events.display()))?;

    let executor = Arc::new(PaperExecutor::new());
    let journal = open_journal(&config).await?;
    // Paper positions stay in memory; `positions.path` belongs to live runs
    let mut sniper = Sniper::new(config.clone(), market, executor, journal.clone())?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let stats = sniper.run(&mut source, shutdown).await;
    sniper.positions().settle().await;

    println!("\n=== REPLAY SUMMARY ===\n");
    println!("Events:         {}", stats.events);
    println!("Tokens created: {}", stats.tokens_created);
    println!("Evaluations:    {}", stats.evaluations);
    println!("  Accepted:     {}", stats.accepted);
    println!("  Rejected:     {}", stats.rejected);
    println!("  Deferred:     {} ({} expired)", stats.deferred, stats.defers_expired);
    println!("Skipped:        {}", stats.skipped);
    println!("Entries:        {} ({} failed)", stats.entries, stats.entries_failed);

    let closed = sniper.positions().closed_positions();
    println!("\n=== CLOSED POSITIONS ({}) ===\n", closed.len());
    for pos in &closed {
        println!(
            "{}  {:?}  entry ${:.0}  high ${:.0}  last ${:.0}",
            pos.token, pos.state, pos.entry_mcap, pos.highest_mcap_seen, pos.last_mcap
        );
    }

    let open = sniper.positions().open_positions();
    println!("\n=== OPEN POSITIONS ({}) ===\n", open.len());
    for pos in &open {
        println!(
            "{}  {:?}  entry ${:.0}  last ${:.0}  P&L {:+.1}%  sold {:.0}%",
            pos.token,
            pos.state,
            pos.entry_mcap,
            pos.last_mcap,
            pos.pnl_pct(),
            pos.sold_fraction * 100.0
        );
    }

    let summary = journal.summary().await;
    println!("\n=== TRADES ===\n");
    println!("Buys:  {} ({:.4} spent)", summary.buy_count, summary.total_bought);
    println!("Sells: {} ({:.4} received)", summary.sell_count, summary.total_sold);
    println!(
        "Realized P&L: {:+.4} ({} wins / {} losses)",
        summary.realized_pnl, summary.winning_sells, summary.losing_sells
    );

    let ledger = sniper.ledger().snapshot(Utc::now()).await;
    println!(
        "Daily loss used: {:.4} / {:.4}",
        ledger.daily_loss, ledger.daily_loss_ceiling
    );

    sniper.positions().shutdown();
    info!("Replay finished");
    Ok(())
}

/// Validate one candidate snapshot and show what the engine would do
pub async fn check(config: &Config, candidate: &Path, at: Option<DateTime<Utc>>) -> Result<()> {
    let raw = tokio::fs::read_to_string(candidate)
        .await
        .with_context(|| format!("Failed to read {}", candidate.display()))?;
    let candidate: TokenCandidate =
        serde_json::from_str(&raw).context("Failed to parse candidate snapshot")?;

    let validator = TokenValidator::new(
        config,
        Arc::new(SnapshotLiquidityProbe::new(config.probes.min_liquidity_usd)),
        Arc::new(SellQuoteProbe::new()),
    )?;
    let now = at.unwrap_or_else(Utc::now);
    let verdict = validator.evaluate_at(&candidate, now).await;

    let report = FundingGraphAnalyzer::new(&config.bundling)
        .analyze(&candidate.top_holders, config.bundling.common_funder_threshold);

    // A fresh ledger: no open positions, no losses
    let config = Arc::new(config.clone());
    let ledger = Arc::new(RiskLedger::new(&config.risk));
    let engine = DecisionEngine::new(Box::new(SniperStrategy), ledger, config);
    let decision = engine.decide_at(&candidate, &verdict, now).await;

    println!("\n=== CANDIDATE {} ===\n", candidate.token);
    println!("Evaluated at: {}", now.to_rfc3339());
    println!("Age:          {:.1} min", candidate.age_minutes(now));
    println!("Market cap:   ${:.0}", candidate.market_cap);
    match candidate.dev_holding_pct() {
        Some(pct) => println!("Dev holding:  {:.2}%", pct),
        None => println!("Dev holding:  n/a (zero supply)"),
    }
    println!("\nFunding graph:\n{}", serde_json::to_string_pretty(&report)?);
    println!("\nVerdict:\n{}", serde_json::to_string_pretty(&verdict)?);
    println!("\nDecision:\n{}", serde_json::to_string_pretty(&decision)?);

    Ok(())
}

/// List the open positions persisted by a previous run
pub async fn positions(config: &Config) -> Result<()> {
    let Some(path) = &config.positions.path else {
        println!("positions.path is not set; open positions are kept in memory only");
        return Ok(());
    };
    let store = PositionStore::load(path)
        .await
        .with_context(|| format!("Failed to load positions file {}", path))?;
    let records = store.records().await;

    println!("\n=== STORED OPEN POSITIONS ({}) ===\n", records.len());
    for r in &records {
        let last = r.last_tick.map(|(_, mcap)| mcap).unwrap_or(r.entry_mcap);
        println!(
            "{}  {:?}  entry ${:.0} at {}  high ${:.0}  last ${:.0}  sold {:.0}%",
            r.token,
            r.state,
            r.entry_mcap,
            r.entry_time.to_rfc3339(),
            r.highest_mcap_seen,
            last,
            r.sold_fraction * 100.0
        );
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
