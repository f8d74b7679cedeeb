//! Executor boundary
//!
//! Signing and submission live behind [`Executor`]. Calls are opaque and may
//! fail; entries retry a bounded number of times and are then forgone, exits
//! retry aggressively and escalate when exhausted.

use async_trait::async_trait;
use backoff::{backoff::Backoff, future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{error, warn};

use crate::config::ExecutionConfig;
use crate::error::{Error, Result};

/// Confirmation of a submitted trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub signature: String,
    /// Base asset spent (buy) or received (sell), when the executor knows it
    #[serde(default)]
    pub base_amount: Option<f64>,
}

/// Trade submission
#[async_trait]
pub trait Executor: Send + Sync {
    async fn buy(&self, token: &str, amount: f64, max_slippage_bps: u32) -> Result<Receipt>;

    /// Sell `fraction` of the current holdings of `token`
    async fn sell(&self, token: &str, fraction: f64, max_slippage_bps: u32) -> Result<Receipt>;

    /// Atomic two-pool arbitrage, executed elsewhere as a black box
    async fn arbitrage(
        &self,
        pair_a: &str,
        pair_b: &str,
        token: &str,
        amount: f64,
    ) -> Result<Receipt>;
}

/// Bounded exponential retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl RetryPolicy {
    /// Entry policy: a few attempts, then forgo the trade
    pub fn entry(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.entry_retry_attempts,
            initial_interval: Duration::from_millis(config.entry_retry_base_ms),
            max_interval: Duration::from_millis(config.entry_retry_base_ms * 4),
        }
    }

    /// Exit policy: many fast attempts, capital is at risk
    pub fn exit(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.exit_retry_attempts,
            initial_interval: Duration::from_millis(config.exit_retry_base_ms),
            max_interval: Duration::from_millis(config.exit_retry_max_ms),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(None)
            .build();
        backoff.reset();
        backoff
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out
///
/// Returns the last error and the number of attempts made.
pub async fn retry_execution<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    token: &str,
    op: F,
) -> std::result::Result<T, (Error, u32)>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = AtomicU32::new(0);
    let max_attempts = policy.max_attempts.max(1);
    let op = &op;
    let counter = &attempts;

    let result = retry(policy.backoff(), move || async move {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        match op().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    mint = %token,
                    op = label,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %e,
                    "Execution failed, retrying"
                );
                Err(backoff::Error::transient(e))
            }
            Err(e) => Err(backoff::Error::permanent(e)),
        }
    })
    .await;

    result.map_err(|e| (e, attempts.load(Ordering::SeqCst)))
}

/// Buy with the entry policy; failure means the trade is forgone
pub async fn buy_with_retry(
    executor: &dyn Executor,
    policy: &RetryPolicy,
    token: &str,
    amount: f64,
    max_slippage_bps: u32,
) -> Result<Receipt> {
    retry_execution(policy, "buy", token, move || {
        executor.buy(token, amount, max_slippage_bps)
    })
    .await
    .map_err(|(e, attempts)| {
        warn!(mint = %token, attempts = attempts, error = %e, "Entry forgone");
        e
    })
}

/// Sell with the exit policy; exhaustion is a fatal operator alert
pub async fn sell_with_retry(
    executor: &dyn Executor,
    policy: &RetryPolicy,
    token: &str,
    fraction: f64,
    max_slippage_bps: u32,
) -> Result<Receipt> {
    retry_execution(policy, "sell", token, move || {
        executor.sell(token, fraction, max_slippage_bps)
    })
    .await
    .map_err(|(e, attempts)| {
        error!(
            mint = %token,
            attempts = attempts,
            fraction = %fraction,
            error = %e,
            "EXIT FAILED - operator intervention required"
        );
        Error::ExitRetriesExhausted {
            token: token.to_string(),
            attempts,
            last_error: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::simulation::PaperExecutor;
    use tokio_test::{assert_err, assert_ok};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(40),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_recovers_after_transient_failures() {
        let executor = PaperExecutor::new();
        executor.fail_next_buys(2);

        let receipt = assert_ok!(buy_with_retry(&executor, &policy(3), "tok", 1.0, 100).await);
        assert!(receipt.signature.starts_with("paper-"));
        assert_eq!(executor.buy_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_gives_up_after_max_attempts() {
        let executor = PaperExecutor::new();
        executor.fail_next_buys(10);

        let err = assert_err!(buy_with_retry(&executor, &policy(3), "tok", 1.0, 100).await);
        assert!(matches!(err, Error::ExecutionFailed(_)));
        assert_eq!(executor.buy_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_exhaustion_is_safety_violation() {
        let executor = PaperExecutor::new();
        executor.fail_next_sells(100);

        let err = sell_with_retry(&executor, &policy(5), "tok", 1.0, 100)
            .await
            .unwrap_err();
        assert!(err.is_safety_violation());
        assert!(matches!(err, Error::ExitRetriesExhausted { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let result: std::result::Result<(), _> =
            retry_execution(&policy(5), "sell", "tok", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::PositionNotFound("tok".into()))
            })
            .await;

        let (err, made) = result.unwrap_err();
        assert!(matches!(err, Error::PositionNotFound(_)));
        assert_eq!(made, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
