//! Per-position monitor task
//!
//! Each open position is owned by exactly one task. Ticks, activity and
//! manual exits arrive over its command channel and are applied in order, so
//! two sells can never race on the same position. Ledger updates happen only
//! after a fill is confirmed and applied. The durable record is saved when the
//! task starts and whenever a fill, the trailing anchor or its arming changes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::journal::{TradeJournal, TradeRecord, TradeSide};
use crate::strategy::portfolio_risk::RiskLedger;
use crate::stream::events::MarketTick;
use crate::trading::executor::{sell_with_retry, Executor, RetryPolicy};

use super::exit_rules::{Position, PositionSnapshot, SellInstruction};
use super::store::PositionStore;

/// Messages a monitor task accepts
#[derive(Debug)]
pub enum PositionCommand {
    Tick(MarketTick),
    /// Trade activity (transfer) seen for the token
    Activity(DateTime<Utc>),
    ForceExit,
    /// Reply once every earlier command has been handled
    Flush(oneshot::Sender<PositionSnapshot>),
}

/// Registry entry for a running monitor
#[derive(Debug)]
pub struct PositionHandle {
    pub(crate) tx: mpsc::Sender<PositionCommand>,
    pub(crate) cancel: CancellationToken,
    pub(crate) snapshot: watch::Receiver<PositionSnapshot>,
}

/// Dependencies shared by every monitor task
#[derive(Clone)]
pub(crate) struct MonitorContext {
    pub executor: Arc<dyn Executor>,
    pub ledger: Arc<RiskLedger>,
    pub journal: Arc<TradeJournal>,
    pub store: Arc<PositionStore>,
    pub exit_policy: RetryPolicy,
    pub exit_slippage_bps: u32,
    /// `None` disables clock-driven checks
    pub check_interval: Option<Duration>,
    pub open: Arc<DashMap<String, PositionHandle>>,
    pub closed: Arc<DashMap<String, PositionSnapshot>>,
}

pub(crate) async fn run_monitor(
    mut position: Position,
    mut rx: mpsc::Receiver<PositionCommand>,
    snapshot_tx: watch::Sender<PositionSnapshot>,
    cancel: CancellationToken,
    ctx: MonitorContext,
) {
    let token = position.token().to_string();
    let mut clock = ctx.check_interval.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    });

    ctx.store.save(position.record()).await;
    debug!(mint = %token, "Position monitor started");

    loop {
        let durable = (
            position.version(),
            position.highest_mcap_seen(),
            position.is_trailing_armed(),
        );

        let instructions = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(mint = %token, "Position monitor cancelled");
                return;
            }
            cmd = rx.recv() => match cmd {
                Some(PositionCommand::Tick(tick)) => position.on_tick(&tick),
                Some(PositionCommand::Activity(at)) => {
                    position.record_activity(at);
                    Vec::new()
                }
                Some(PositionCommand::ForceExit) => {
                    position.force_exit(Utc::now()).into_iter().collect()
                }
                Some(PositionCommand::Flush(reply)) => {
                    let _ = reply.send(position.snapshot());
                    Vec::new()
                }
                None => {
                    debug!(mint = %token, "Command channel closed");
                    return;
                }
            },
            _ = tick_clock(&mut clock) => position.on_clock(Utc::now()),
        };

        for instruction in instructions {
            if !execute_sell(&mut position, instruction, &ctx).await {
                break;
            }
        }

        let snapshot = position.snapshot();

        if position.state().is_terminal() {
            // Observers must see the slot released once they see the close
            ctx.ledger.release(&token).await;
            ctx.store.remove(&token).await;
            ctx.closed.insert(token.clone(), snapshot.clone());
            ctx.open.remove(&token);
            snapshot_tx.send_replace(snapshot.clone());
            info!(
                mint = %token,
                state = ?snapshot.state,
                highest_mcap = %snapshot.highest_mcap_seen,
                "Position closed"
            );
            cancel.cancel();
            return;
        }

        if durable
            != (
                position.version(),
                position.highest_mcap_seen(),
                position.is_trailing_armed(),
            )
        {
            ctx.store.save(position.record()).await;
        }
        snapshot_tx.send_replace(snapshot);
    }
}

async fn tick_clock(clock: &mut Option<tokio::time::Interval>) {
    match clock {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Execute one sell; returns false when later instructions must not run
async fn execute_sell(
    position: &mut Position,
    instruction: SellInstruction,
    ctx: &MonitorContext,
) -> bool {
    if instruction.seq != position.version() {
        debug!(
            mint = %instruction.token,
            seq = instruction.seq,
            version = position.version(),
            "Discarding stale sell instruction"
        );
        return false;
    }

    info!(
        mint = %instruction.token,
        reason = %instruction.reason,
        fraction = %format!("{:.2}", instruction.fraction),
        market_cap = %instruction.market_cap,
        pnl_pct = %format!("{:.1}", position.pnl_pct(instruction.market_cap)),
        "Exit triggered"
    );

    let receipt = match sell_with_retry(
        ctx.executor.as_ref(),
        &ctx.exit_policy,
        &instruction.token,
        instruction.fraction_of_holdings,
        ctx.exit_slippage_bps,
    )
    .await
    {
        Ok(receipt) => receipt,
        // Already escalated; the position stays as it was
        Err(_) => return false,
    };

    let proceeds = receipt
        .base_amount
        .unwrap_or_else(|| position.estimated_proceeds(instruction.fraction, instruction.market_cap));
    let pnl = proceeds - position.cost_basis(instruction.fraction);

    if let Err(e) = position.apply_fill(&instruction) {
        warn!(mint = %instruction.token, error = %e, "Fill not applied");
        return false;
    }

    let at = instruction.triggered_at;
    ctx.ledger.record_realized(pnl, at).await;
    ctx.journal
        .record(TradeRecord {
            token: instruction.token.clone(),
            side: TradeSide::Sell,
            base_amount: proceeds,
            fraction: Some(instruction.fraction),
            reason: Some(instruction.reason),
            realized_pnl: Some(pnl),
            signature: receipt.signature,
            timestamp: at,
        })
        .await;

    true
}
