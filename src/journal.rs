//! Trade journal
//!
//! Records every confirmed buy and sell, optionally persisted as pretty JSON.
//! Persistence failures are logged and never interrupt trading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;
use crate::position::exit_rules::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single confirmed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub token: String,
    pub side: TradeSide,
    /// Base asset spent (buy) or received (sell)
    pub base_amount: f64,
    /// Fraction of the original position sold
    #[serde(default)]
    pub fraction: Option<f64>,
    #[serde(default)]
    pub reason: Option<ExitReason>,
    #[serde(default)]
    pub realized_pnl: Option<f64>,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

impl TradeRecord {
    pub fn buy(token: &str, amount: f64, signature: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            token: token.to_string(),
            side: TradeSide::Buy,
            base_amount: amount,
            fraction: None,
            reason: None,
            realized_pnl: None,
            signature: signature.to_string(),
            timestamp,
        }
    }
}

/// P&L summary over the whole journal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeSummary {
    pub buy_count: usize,
    pub sell_count: usize,
    pub total_bought: f64,
    pub total_sold: f64,
    pub realized_pnl: f64,
    pub winning_sells: usize,
    pub losing_sells: usize,
}

#[derive(Debug, Default)]
pub struct TradeJournal {
    records: Mutex<Vec<TradeRecord>>,
    path: Option<PathBuf>,
}

impl TradeJournal {
    /// Memory-only journal
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load an existing journal file, or start empty if it does not exist
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records: Vec<TradeRecord> = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No trade journal found, starting fresh");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!(trades = records.len(), "Loaded trade journal");
        Ok(Self {
            records: Mutex::new(records),
            path: Some(path),
        })
    }

    pub async fn record(&self, trade: TradeRecord) {
        info!(
            mint = %trade.token,
            side = ?trade.side,
            base_amount = %format!("{:.4}", trade.base_amount),
            reason = ?trade.reason,
            signature = %trade.signature,
            "Trade recorded"
        );

        let mut records = self.records.lock().await;
        records.push(trade);

        if let Some(path) = &self.path {
            let persisted = match serde_json::to_string_pretty(&*records) {
                Ok(json) => tokio::fs::write(path, json).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(e) = persisted {
                warn!(path = %path.display(), error = %e, "Failed to persist trade journal");
            }
        }
    }

    pub async fn records(&self) -> Vec<TradeRecord> {
        self.records.lock().await.clone()
    }

    pub async fn summary(&self) -> TradeSummary {
        let records = self.records.lock().await;
        let mut summary = TradeSummary::default();
        for trade in records.iter() {
            match trade.side {
                TradeSide::Buy => {
                    summary.buy_count += 1;
                    summary.total_bought += trade.base_amount;
                }
                TradeSide::Sell => {
                    summary.sell_count += 1;
                    summary.total_sold += trade.base_amount;
                    let pnl = trade.realized_pnl.unwrap_or(0.0);
                    summary.realized_pnl += pnl;
                    if pnl > 0.0 {
                        summary.winning_sells += 1;
                    } else if pnl < 0.0 {
                        summary.losing_sells += 1;
                    }
                }
            }
        }
        summary
    }

    pub async fn log_summary(&self) {
        let s = self.summary().await;
        info!(
            buys = s.buy_count,
            bought = %format!("{:.4}", s.total_bought),
            sells = s.sell_count,
            sold = %format!("{:.4}", s.total_sold),
            realized_pnl = %format!("{:.4}", s.realized_pnl),
            wins = s.winning_sells,
            losses = s.losing_sells,
            "Trade journal summary"
        );
    }
}
