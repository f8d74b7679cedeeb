//! Inbound chain events and the collaborator interfaces that deliver them

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::types::TokenCandidate;

/// Price / market-cap observation for one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub token: String,
    pub timestamp: DateTime<Utc>,
    pub market_cap: f64,
    /// Trade volume since the previous tick
    #[serde(default)]
    pub volume: f64,
}

/// Events delivered by the chain feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainEvent {
    TokenCreated {
        token: String,
        creator: String,
        created_at: DateTime<Utc>,
    },
    Transfer {
        token: String,
        from: String,
        to: String,
        amount: f64,
        timestamp: DateTime<Utc>,
    },
    PriceUpdate(MarketTick),
}

impl ChainEvent {
    pub fn token(&self) -> &str {
        match self {
            ChainEvent::TokenCreated { token, .. } => token,
            ChainEvent::Transfer { token, .. } => token,
            ChainEvent::PriceUpdate(tick) => &tick.token,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChainEvent::TokenCreated { created_at, .. } => *created_at,
            ChainEvent::Transfer { timestamp, .. } => *timestamp,
            ChainEvent::PriceUpdate(tick) => tick.timestamp,
        }
    }
}

/// Source of chain events, in per-token timestamp order
#[async_trait]
pub trait EventSource: Send {
    /// `None` once the feed is exhausted
    async fn next_event(&mut self) -> Option<ChainEvent>;
}

#[async_trait]
impl EventSource for tokio::sync::mpsc::Receiver<ChainEvent> {
    async fn next_event(&mut self) -> Option<ChainEvent> {
        self.recv().await
    }
}

/// Fresh candidate snapshots for validation
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn snapshot(&self, token: &str) -> Result<TokenCandidate>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"type":"price_update","token":"0xabc","timestamp":"2026-01-01T00:00:00Z","market_cap":21000.0}"#;
        let event: ChainEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.token(), "0xabc");
        match event {
            ChainEvent::PriceUpdate(tick) => {
                assert_eq!(tick.market_cap, 21_000.0);
                assert_eq!(tick.volume, 0.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
