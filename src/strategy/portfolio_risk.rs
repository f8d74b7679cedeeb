//! Portfolio Risk Ledger
//!
//! Process-wide capital control shared by the decision engine (reserve on
//! entry) and the position manager (record P&L and release on close).
//! Every check-and-mutate happens under one lock, so the open-position count
//! can never exceed the configured maximum.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;

/// Reasons why new positions are blocked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBlock {
    /// Maximum number of concurrent positions reached
    MaxPositionsReached { current: usize, max: usize },
    /// Daily loss ceiling reached
    DailyLossLimitReached { loss: f64, limit: f64 },
    /// Individual position size too large
    PositionTooLarge { requested: f64, max: f64 },
    /// A slot for this token is already held
    AlreadyHolding { token: String },
}

impl RiskBlock {
    /// Get human-readable description
    pub fn description(&self) -> String {
        match self {
            RiskBlock::MaxPositionsReached { current, max } => {
                format!("Max positions reached: {}/{}", current, max)
            }
            RiskBlock::DailyLossLimitReached { loss, limit } => {
                format!("Daily loss limit: {:.4}/{:.4}", loss, limit)
            }
            RiskBlock::PositionTooLarge { requested, max } => {
                format!("Position too large: {:.4} exceeds max {:.4}", requested, max)
            }
            RiskBlock::AlreadyHolding { token } => format!("Already holding {}", token),
        }
    }
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub open_positions: usize,
    pub max_concurrent: usize,
    pub committed: f64,
    pub daily_loss: f64,
    pub daily_loss_ceiling: f64,
    pub can_open_new: bool,
}

#[derive(Debug)]
struct LedgerState {
    /// token -> committed base amount (reserved or open)
    slots: HashMap<String, f64>,
    daily_loss: f64,
    /// UTC day the loss total belongs to; set by the first timestamp seen
    day: Option<NaiveDate>,
}

impl LedgerState {
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        match self.day {
            Some(day) if today > day => {
                if self.daily_loss > 0.0 {
                    info!(
                        previous_day = %day,
                        loss = %format!("{:.4}", self.daily_loss),
                        "Daily loss reset"
                    );
                }
                self.day = Some(today);
                self.daily_loss = 0.0;
            }
            Some(_) => {}
            None => self.day = Some(today),
        }
    }
}

/// Shared portfolio risk state
#[derive(Debug)]
pub struct RiskLedger {
    max_concurrent: usize,
    max_position_size: f64,
    daily_loss_ceiling: f64,
    state: Mutex<LedgerState>,
}

impl RiskLedger {
    /// Ledger whose trading day starts with the first timestamp it is given
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_positions,
            max_position_size: config.max_position_size(),
            daily_loss_ceiling: config.daily_loss_ceiling(),
            state: Mutex::new(LedgerState {
                slots: HashMap::new(),
                daily_loss: 0.0,
                day: None,
            }),
        }
    }

    /// Ledger whose trading day starts at `now`
    pub fn with_day(config: &RiskConfig, now: DateTime<Utc>) -> Self {
        let mut ledger = Self::new(config);
        ledger.state.get_mut().day = Some(now.date_naive());
        ledger
    }

    pub fn max_position_size(&self) -> f64 {
        self.max_position_size
    }

    /// Check every entry gate and take a slot in one step
    pub async fn try_reserve(
        &self,
        token: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), RiskBlock> {
        let mut state = self.state.lock().await;
        state.roll_day(now);

        if state.slots.contains_key(token) {
            return Err(RiskBlock::AlreadyHolding {
                token: token.to_string(),
            });
        }

        if state.slots.len() >= self.max_concurrent {
            return Err(RiskBlock::MaxPositionsReached {
                current: state.slots.len(),
                max: self.max_concurrent,
            });
        }

        if state.daily_loss >= self.daily_loss_ceiling {
            return Err(RiskBlock::DailyLossLimitReached {
                loss: state.daily_loss,
                limit: self.daily_loss_ceiling,
            });
        }

        if amount > self.max_position_size + f64::EPSILON {
            return Err(RiskBlock::PositionTooLarge {
                requested: amount,
                max: self.max_position_size,
            });
        }

        state.slots.insert(token.to_string(), amount);
        debug!(
            mint = %token,
            amount = %amount,
            open = state.slots.len(),
            "Risk slot reserved"
        );
        Ok(())
    }

    /// Re-take the slot of a position that was open before a restart
    ///
    /// Entry gates are not checked: the position exists whether or not it
    /// would be allowed today. Returns false if the slot was already held.
    pub async fn restore(&self, token: &str, amount: f64) -> bool {
        let mut state = self.state.lock().await;
        let inserted = state.slots.insert(token.to_string(), amount).is_none();
        if state.slots.len() > self.max_concurrent {
            warn!(
                open = state.slots.len(),
                max = self.max_concurrent,
                "Restored positions exceed the concurrency limit"
            );
        }
        inserted
    }

    /// Give back a slot whose entry never filled
    pub async fn cancel_reservation(&self, token: &str) -> bool {
        let removed = self.state.lock().await.slots.remove(token).is_some();
        if removed {
            debug!(mint = %token, "Risk reservation cancelled");
        }
        removed
    }

    /// Release the slot of a position that reached a terminal state
    pub async fn release(&self, token: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.slots.remove(token).is_some();
        if removed {
            debug!(mint = %token, open = state.slots.len(), "Risk slot released");
        } else {
            warn!(mint = %token, "Release for unknown risk slot");
        }
        removed
    }

    /// Record a realized P&L; only losses count toward the daily ceiling
    pub async fn record_realized(&self, pnl: f64, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        state.roll_day(now);
        if pnl < 0.0 {
            state.daily_loss += -pnl;
            if state.daily_loss >= self.daily_loss_ceiling {
                warn!(
                    loss = %format!("{:.4}", state.daily_loss),
                    limit = %format!("{:.4}", self.daily_loss_ceiling),
                    "Daily loss ceiling reached, new entries blocked"
                );
            }
        }
    }

    pub async fn open_positions(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    pub async fn holds(&self, token: &str) -> bool {
        self.state.lock().await.slots.contains_key(token)
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> LedgerSnapshot {
        let mut state = self.state.lock().await;
        state.roll_day(now);
        let open_positions = state.slots.len();
        LedgerSnapshot {
            open_positions,
            max_concurrent: self.max_concurrent,
            committed: state.slots.values().sum(),
            daily_loss: state.daily_loss,
            daily_loss_ceiling: self.daily_loss_ceiling,
            can_open_new: open_positions < self.max_concurrent
                && state.daily_loss < self.daily_loss_ceiling,
        }
    }
}
