//! Position exit state machine
//!
//! Pure and synchronous: market ticks and clock checks go in, sell
//! instructions come out. Nothing here talks to the executor or the ledger;
//! a sell only changes the position once its fill is applied.
//!
//! Exit precedence when several conditions hold on the same tick:
//! HardStop > MaxHold > NoVolume > MigrationReached > TrailingStop > TakeProfit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ExitConfig, TakeProfitLevel};
use crate::error::{Error, Result};
use crate::stream::events::MarketTick;

/// Remaining fractions below this are treated as fully sold
const FRACTION_EPSILON: f64 = 1e-9;

/// Why a position was (or is being) closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    HardStop,
    MaxHold,
    NoVolume,
    MigrationReached,
    TrailingStop,
    TakeProfit,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::HardStop => "hard_stop",
            ExitReason::MaxHold => "max_hold",
            ExitReason::NoVolume => "no_volume",
            ExitReason::MigrationReached => "migration",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// Freshly bought
    Open,
    /// Profit passed the trailing activation level
    Trailing,
    /// At least one take-profit rung sold
    SecuredProfit,
    Closed(ExitReason),
}

impl PositionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionState::Closed(_))
    }
}

/// A sell the position wants executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellInstruction {
    pub token: String,
    /// Position version this instruction expects when its fill is applied
    pub seq: u64,
    /// Fraction of the original position
    pub fraction: f64,
    /// Same amount as a fraction of what is still held when it executes
    pub fraction_of_holdings: f64,
    pub reason: ExitReason,
    /// Sells everything that remains
    pub terminal: bool,
    /// Market cap that triggered the sell
    pub market_cap: f64,
    /// Time of the tick or clock check that triggered the sell
    pub triggered_at: DateTime<Utc>,
    /// Take-profit rung this instruction realizes
    pub rung: Option<usize>,
}

/// Exit thresholds resolved from config
#[derive(Debug, Clone)]
pub struct ExitRules {
    pub hard_stop_loss_pct: f64,
    pub trailing_min_profit_pct: f64,
    pub trailing_drop_pct: f64,
    pub max_hold: Duration,
    pub no_volume: Duration,
    pub migration_mcap: f64,
    pub take_profit_targets: Vec<TakeProfitLevel>,
}

impl ExitRules {
    pub fn from_config(config: &ExitConfig) -> Self {
        Self {
            hard_stop_loss_pct: config.hard_stop_loss_pct,
            trailing_min_profit_pct: config.trailing_min_profit_pct,
            trailing_drop_pct: config.trailing_drop_pct,
            max_hold: Duration::seconds(config.max_hold_secs as i64),
            no_volume: Duration::seconds(config.no_volume_secs as i64),
            migration_mcap: config.migration_mcap,
            take_profit_targets: config.take_profit_targets.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Rung {
    market_cap: f64,
    fraction: f64,
    hit: bool,
}

/// Read-only view published by the monitor task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub token: String,
    pub state: PositionState,
    pub entry_mcap: f64,
    pub entry_time: DateTime<Utc>,
    pub amount: f64,
    pub highest_mcap_seen: f64,
    pub last_mcap: f64,
    pub sold_fraction: f64,
    pub version: u64,
}

impl PositionSnapshot {
    pub fn pnl_pct(&self) -> f64 {
        (self.last_mcap / self.entry_mcap - 1.0) * 100.0
    }
}

/// Durable form of an open position, written so monitoring can resume after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub token: String,
    pub state: PositionState,
    pub entry_mcap: f64,
    pub entry_time: DateTime<Utc>,
    pub amount: f64,
    pub highest_mcap_seen: f64,
    pub sold_fraction: f64,
    pub version: u64,
    pub trailing_armed: bool,
    /// Take-profit rungs already sold, by ascending threshold index
    #[serde(default)]
    pub rungs_hit: Vec<usize>,
    #[serde(default)]
    pub last_tick: Option<(DateTime<Utc>, f64)>,
    pub last_volume_at: DateTime<Utc>,
}

/// One open position and its exit state machine
#[derive(Debug, Clone)]
pub struct Position {
    token: String,
    entry_mcap: f64,
    entry_time: DateTime<Utc>,
    amount: f64,
    highest_mcap_seen: f64,
    sold_fraction: f64,
    state: PositionState,
    version: u64,
    trailing_armed: bool,
    rungs: Vec<Rung>,
    last_tick: Option<(DateTime<Utc>, f64)>,
    last_volume_at: DateTime<Utc>,
    rules: ExitRules,
}

impl Position {
    pub fn open(
        token: impl Into<String>,
        entry_mcap: f64,
        amount: f64,
        entry_time: DateTime<Utc>,
        rules: ExitRules,
    ) -> Self {
        let mut rungs: Vec<Rung> = rules
            .take_profit_targets
            .iter()
            .map(|level| Rung {
                market_cap: level.threshold.market_cap(entry_mcap),
                fraction: level.sell_fraction,
                hit: false,
            })
            .collect();
        rungs.sort_by(|a, b| a.market_cap.total_cmp(&b.market_cap));

        Self {
            token: token.into(),
            entry_mcap,
            entry_time,
            amount,
            highest_mcap_seen: entry_mcap,
            sold_fraction: 0.0,
            state: PositionState::Open,
            version: 0,
            trailing_armed: false,
            rungs,
            last_tick: None,
            last_volume_at: entry_time,
            rules,
        }
    }

    /// Rebuild a position from its durable record under the current rules
    ///
    /// `resumed_at` restarts the no-volume window; activity missed while the
    /// process was down is unknown.
    pub fn restore(record: PositionRecord, rules: ExitRules, resumed_at: DateTime<Utc>) -> Self {
        let mut position = Self::open(
            record.token,
            record.entry_mcap,
            record.amount,
            record.entry_time,
            rules,
        );
        for index in record.rungs_hit {
            if let Some(rung) = position.rungs.get_mut(index) {
                rung.hit = true;
            }
        }
        position.state = record.state;
        position.highest_mcap_seen = record.highest_mcap_seen.max(record.entry_mcap);
        position.sold_fraction = record.sold_fraction;
        position.version = record.version;
        position.trailing_armed = record.trailing_armed;
        position.last_tick = record.last_tick;
        position.last_volume_at = record.last_volume_at.max(resumed_at);
        position
    }

    pub fn record(&self) -> PositionRecord {
        PositionRecord {
            token: self.token.clone(),
            state: self.state,
            entry_mcap: self.entry_mcap,
            entry_time: self.entry_time,
            amount: self.amount,
            highest_mcap_seen: self.highest_mcap_seen,
            sold_fraction: self.sold_fraction,
            version: self.version,
            trailing_armed: self.trailing_armed,
            rungs_hit: self
                .rungs
                .iter()
                .enumerate()
                .filter(|(_, r)| r.hit)
                .map(|(i, _)| i)
                .collect(),
            last_tick: self.last_tick,
            last_volume_at: self.last_volume_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn entry_mcap(&self) -> f64 {
        self.entry_mcap
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn highest_mcap_seen(&self) -> f64 {
        self.highest_mcap_seen
    }

    pub fn sold_fraction(&self) -> f64 {
        self.sold_fraction
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_trailing_armed(&self) -> bool {
        self.trailing_armed
    }

    pub fn remaining_fraction(&self) -> f64 {
        (1.0 - self.sold_fraction).max(0.0)
    }

    fn last_mcap(&self) -> f64 {
        self.last_tick.map(|(_, m)| m).unwrap_or(self.entry_mcap)
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            token: self.token.clone(),
            state: self.state,
            entry_mcap: self.entry_mcap,
            entry_time: self.entry_time,
            amount: self.amount,
            highest_mcap_seen: self.highest_mcap_seen,
            last_mcap: self.last_mcap(),
            sold_fraction: self.sold_fraction,
            version: self.version,
        }
    }

    /// Unrealized profit in percent at `mcap`
    pub fn pnl_pct(&self, mcap: f64) -> f64 {
        (mcap / self.entry_mcap - 1.0) * 100.0
    }

    /// Base asset committed for `fraction` of the original position
    pub fn cost_basis(&self, fraction: f64) -> f64 {
        self.amount * fraction
    }

    /// Proceeds expected from selling `fraction` of the original position at `mcap`
    pub fn estimated_proceeds(&self, fraction: f64, mcap: f64) -> f64 {
        self.amount * fraction * mcap / self.entry_mcap
    }

    /// Trade activity seen for the token outside of price ticks
    pub fn record_activity(&mut self, at: DateTime<Utc>) {
        if at > self.last_volume_at {
            self.last_volume_at = at;
        }
    }

    /// Feed a market tick; returns the sells it triggers
    ///
    /// A tick older than the last one, repeating its timestamp and market
    /// cap, or carrying a market cap that is not a finite number, is ignored.
    pub fn on_tick(&mut self, tick: &MarketTick) -> Vec<SellInstruction> {
        if self.state.is_terminal() || !tick.market_cap.is_finite() {
            return Vec::new();
        }

        if let Some((ts, mcap)) = self.last_tick {
            if tick.timestamp < ts || (tick.timestamp == ts && tick.market_cap == mcap) {
                return Vec::new();
            }
        }

        self.last_tick = Some((tick.timestamp, tick.market_cap));
        if tick.volume > 0.0 {
            self.record_activity(tick.timestamp);
        }
        if tick.market_cap > self.highest_mcap_seen {
            self.highest_mcap_seen = tick.market_cap;
        }

        if !self.trailing_armed && self.pnl_pct(tick.market_cap) > self.rules.trailing_min_profit_pct
        {
            self.trailing_armed = true;
            if self.state == PositionState::Open {
                self.state = PositionState::Trailing;
            }
        }

        if let Some(reason) = self.terminal_exit(tick.timestamp, Some(tick.market_cap)) {
            return vec![self.close_instruction(reason, tick.market_cap, tick.timestamp)];
        }

        self.ladder_instructions(tick.market_cap, tick.timestamp)
    }

    /// Re-check the time-based exits without a new price
    pub fn on_clock(&mut self, now: DateTime<Utc>) -> Vec<SellInstruction> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        match self.terminal_exit(now, None) {
            Some(reason) => vec![self.close_instruction(reason, self.last_mcap(), now)],
            None => Vec::new(),
        }
    }

    /// Sell everything that remains with reason `Manual`
    pub fn force_exit(&self, now: DateTime<Utc>) -> Option<SellInstruction> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.close_instruction(ExitReason::Manual, self.last_mcap(), now))
    }

    /// Commit a confirmed sell
    pub fn apply_fill(&mut self, instruction: &SellInstruction) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::PositionClosed(self.token.clone()));
        }
        if instruction.seq != self.version {
            return Err(Error::StaleInstruction {
                token: self.token.clone(),
                expected: self.version,
                got: instruction.seq,
            });
        }

        self.version += 1;
        self.sold_fraction = (self.sold_fraction + instruction.fraction).min(1.0);
        if let Some(rung) = instruction.rung.and_then(|i| self.rungs.get_mut(i)) {
            rung.hit = true;
        }

        self.state = if instruction.terminal || self.remaining_fraction() <= FRACTION_EPSILON {
            self.sold_fraction = 1.0;
            PositionState::Closed(instruction.reason)
        } else {
            PositionState::SecuredProfit
        };
        Ok(())
    }

    fn terminal_exit(&self, now: DateTime<Utc>, mcap: Option<f64>) -> Option<ExitReason> {
        let rules = &self.rules;

        if let Some(mcap) = mcap {
            if mcap <= self.entry_mcap * (1.0 + rules.hard_stop_loss_pct / 100.0) {
                return Some(ExitReason::HardStop);
            }
        }

        if now - self.entry_time > rules.max_hold {
            return Some(ExitReason::MaxHold);
        }

        if now - self.last_volume_at > rules.no_volume {
            return Some(ExitReason::NoVolume);
        }

        let mcap = mcap?;

        if mcap >= rules.migration_mcap {
            return Some(ExitReason::MigrationReached);
        }

        if self.trailing_armed
            && mcap <= self.highest_mcap_seen * (1.0 - rules.trailing_drop_pct / 100.0)
        {
            return Some(ExitReason::TrailingStop);
        }

        None
    }

    fn close_instruction(
        &self,
        reason: ExitReason,
        mcap: f64,
        at: DateTime<Utc>,
    ) -> SellInstruction {
        SellInstruction {
            token: self.token.clone(),
            seq: self.version,
            fraction: self.remaining_fraction(),
            fraction_of_holdings: 1.0,
            reason,
            terminal: true,
            market_cap: mcap,
            triggered_at: at,
            rung: None,
        }
    }

    fn ladder_instructions(&self, mcap: f64, at: DateTime<Utc>) -> Vec<SellInstruction> {
        let mut out = Vec::new();
        let mut remaining = self.remaining_fraction();
        let mut seq = self.version;

        for (i, rung) in self.rungs.iter().enumerate() {
            if rung.hit || mcap < rung.market_cap {
                continue;
            }
            if remaining <= FRACTION_EPSILON {
                break;
            }

            let fraction = rung.fraction.min(remaining);
            let terminal = remaining - fraction <= FRACTION_EPSILON;
            out.push(SellInstruction {
                token: self.token.clone(),
                seq,
                fraction,
                fraction_of_holdings: if terminal { 1.0 } else { fraction / remaining },
                reason: ExitReason::TakeProfit,
                terminal,
                market_cap: mcap,
                triggered_at: at,
                rung: Some(i),
            });
            remaining -= fraction;
            seq += 1;
            if terminal {
                break;
            }
        }

        out
    }
}
