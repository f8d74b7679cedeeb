//! JSON-lines replay of recorded chain events
//!
//! Each line is either an event or a candidate snapshot:
//!
//! ```text
//! {"record":"snapshot","candidate":{"token":"0xabc", ...}}
//! {"record":"event","event":{"type":"token_created","token":"0xabc", ...}}
//! {"record":"event","event":{"type":"price_update","token":"0xabc", ...}}
//! ```
//!
//! Snapshots are loaded into an [`InMemoryMarketData`] store as they are
//! reached, so a deferred candidate sees the market cap of its time.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::filter::types::TokenCandidate;

use super::events::{ChainEvent, EventSource, MarketDataProvider, MarketTick};

/// One line of a replay file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ReplayRecord {
    Event { event: ChainEvent },
    Snapshot { candidate: TokenCandidate },
}

/// Market data served from memory
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    candidates: DashMap<String, TokenCandidate>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, candidate: TokenCandidate) {
        self.candidates.insert(candidate.token.clone(), candidate);
    }

    /// Carry a price update into the stored snapshot
    pub fn apply_tick(&self, tick: &MarketTick) {
        if let Some(mut candidate) = self.candidates.get_mut(&tick.token) {
            candidate.market_cap = tick.market_cap;
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketData {
    async fn snapshot(&self, token: &str) -> Result<TokenCandidate> {
        self.candidates
            .get(token)
            .map(|c| c.value().clone())
            .ok_or_else(|| Error::MarketData {
                token: token.to_string(),
                reason: "no snapshot recorded".to_string(),
            })
    }
}

/// Event source replaying recorded lines in file order
pub struct ReplaySource {
    records: VecDeque<ReplayRecord>,
    market: Arc<InMemoryMarketData>,
}

impl ReplaySource {
    pub fn new(records: Vec<ReplayRecord>, market: Arc<InMemoryMarketData>) -> Self {
        Self {
            records: records.into(),
            market,
        }
    }

    /// Parse JSON lines; blank lines and `#` comments are skipped
    pub fn parse(input: &str, market: Arc<InMemoryMarketData>) -> Result<Self> {
        let mut records = Vec::new();
        for (lineno, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(line).map_err(|e| {
                Error::Serialization(format!("line {}: {}", lineno + 1, e))
            })?;
            records.push(record);
        }
        Ok(Self::new(records, market))
    }

    pub async fn from_file(path: impl AsRef<Path>, market: Arc<InMemoryMarketData>) -> Result<Self> {
        let path = path.as_ref();
        let input = tokio::fs::read_to_string(path).await?;
        let source = Self::parse(&input, market)?;
        info!(
            path = %path.display(),
            records = source.remaining(),
            "Loaded replay file"
        );
        Ok(source)
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    async fn next_event(&mut self) -> Option<ChainEvent> {
        while let Some(record) = self.records.pop_front() {
            match record {
                ReplayRecord::Snapshot { candidate } => {
                    debug!(mint = %candidate.token, "Replay snapshot");
                    self.market.upsert(candidate);
                }
                ReplayRecord::Event { event } => {
                    if let ChainEvent::PriceUpdate(tick) = &event {
                        self.market.apply_tick(tick);
                    }
                    return Some(event);
                }
            }
        }
        None
    }
}
