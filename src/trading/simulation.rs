//! Paper trading executor
//!
//! Dry-run implementation of [`Executor`] that fills every order instantly and
//! records it. Failures can be scripted to exercise retry paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::executor::{Executor, Receipt};

/// A call the paper executor filled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionCall {
    Buy {
        token: String,
        amount: f64,
        max_slippage_bps: u32,
    },
    Sell {
        token: String,
        fraction: f64,
        max_slippage_bps: u32,
    },
    Arbitrage {
        pair_a: String,
        pair_b: String,
        token: String,
        amount: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledCall {
    pub call: ExecutionCall,
    pub signature: String,
    pub at: DateTime<Utc>,
}

/// Executor that never touches the chain
#[derive(Debug, Default)]
pub struct PaperExecutor {
    filled: Mutex<Vec<FilledCall>>,
    fail_buys: AtomicU32,
    fail_sells: AtomicU32,
    buy_attempts: AtomicU32,
    sell_attempts: AtomicU32,
}

impl PaperExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` buy attempts fail with a retryable error
    pub fn fail_next_buys(&self, n: u32) {
        self.fail_buys.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` sell attempts fail with a retryable error
    pub fn fail_next_sells(&self, n: u32) {
        self.fail_sells.store(n, Ordering::SeqCst);
    }

    pub fn buy_attempts(&self) -> u32 {
        self.buy_attempts.load(Ordering::SeqCst)
    }

    pub fn sell_attempts(&self) -> u32 {
        self.sell_attempts.load(Ordering::SeqCst)
    }

    /// Every order filled so far, in fill order
    pub async fn filled(&self) -> Vec<FilledCall> {
        self.filled.lock().await.clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn fill(&self, call: ExecutionCall) -> Receipt {
        let signature = format!("paper-{}", uuid::Uuid::new_v4());
        debug!(call = ?call, signature = %signature, "Paper fill");
        self.filled.lock().await.push(FilledCall {
            call,
            signature: signature.clone(),
            at: Utc::now(),
        });
        Receipt {
            signature,
            base_amount: None,
        }
    }
}

#[async_trait]
impl Executor for PaperExecutor {
    async fn buy(&self, token: &str, amount: f64, max_slippage_bps: u32) -> Result<Receipt> {
        self.buy_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_buys) {
            return Err(Error::ExecutionFailed(format!("simulated buy failure for {}", token)));
        }
        info!(mint = %token, amount = %amount, "[PAPER] Buy");
        Ok(self
            .fill(ExecutionCall::Buy {
                token: token.to_string(),
                amount,
                max_slippage_bps,
            })
            .await)
    }

    async fn sell(&self, token: &str, fraction: f64, max_slippage_bps: u32) -> Result<Receipt> {
        self.sell_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_sells) {
            return Err(Error::ExecutionFailed(format!("simulated sell failure for {}", token)));
        }
        info!(mint = %token, fraction = %format!("{:.2}", fraction), "[PAPER] Sell");
        Ok(self
            .fill(ExecutionCall::Sell {
                token: token.to_string(),
                fraction,
                max_slippage_bps,
            })
            .await)
    }

    async fn arbitrage(
        &self,
        pair_a: &str,
        pair_b: &str,
        token: &str,
        amount: f64,
    ) -> Result<Receipt> {
        info!(mint = %token, pair_a = %pair_a, pair_b = %pair_b, "[PAPER] Arbitrage");
        Ok(self
            .fill(ExecutionCall::Arbitrage {
                pair_a: pair_a.to_string(),
                pair_b: pair_b.to_string(),
                token: token.to_string(),
                amount,
            })
            .await)
    }
}
