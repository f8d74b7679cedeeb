//! Error types for the sniper core

use thiserror::Error;

use crate::strategy::portfolio_risk::RiskBlock;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper core
///
/// Rejections, deferrals and skips are ordinary values, not errors. This enum
/// only carries failures of collaborators and violated preconditions.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    // Market data errors
    #[error("Market data unavailable for {token}: {reason}")]
    MarketData { token: String, reason: String },

    #[error("Market data timeout after {0}ms")]
    MarketDataTimeout(u64),

    // Probe errors
    #[error("Probe {probe} failed: {reason}")]
    ProbeFailed { probe: String, reason: String },

    #[error("Probe {probe} timed out after {timeout_ms}ms")]
    ProbeTimeout { probe: String, timeout_ms: u64 },

    // Execution errors
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Exit for {token} failed after {attempts} attempts: {last_error}")]
    ExitRetriesExhausted {
        token: String,
        attempts: u32,
        last_error: String,
    },

    // Risk errors
    #[error("Risk limit exceeded: {}", .0.description())]
    RiskLimitExceeded(RiskBlock),

    // Position management errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position already closed: {0}")]
    PositionClosed(String),

    #[error("Stale exit instruction for {token}: expected seq {expected}, got {got}")]
    StaleInstruction { token: String, expected: u64, got: u64 },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ExecutionFailed(_)
                | Error::MarketData { .. }
                | Error::MarketDataTimeout(_)
                | Error::ProbeTimeout { .. }
        )
    }

    /// Check if this error is a safety violation
    pub fn is_safety_violation(&self) -> bool {
        matches!(
            self,
            Error::RiskLimitExceeded(_) | Error::ExitRetriesExhausted { .. }
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidRegex(e.to_string())
    }
}
