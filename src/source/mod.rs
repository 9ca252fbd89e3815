pub mod rest;
pub mod synthetic;

pub use rest::RestProvider;
pub use synthetic::SyntheticProvider;

use crate::stream::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream provider unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// The time range one fetch covers: `period / interval` candles, newest
/// first. Labels are the raw configured values ("1d", "1m") and travel into
/// each candle's payload.
#[derive(Debug, Clone)]
pub struct FetchWindow {
    pub period: Duration,
    pub interval: Duration,
    pub period_label: String,
    pub interval_label: String,
}

impl FetchWindow {
    /// Number of candles the window spans. Config validation guarantees a
    /// non-zero interval and `period >= interval`.
    pub fn record_count(&self) -> usize {
        let interval_ms = self.interval.as_millis().max(1);
        (self.period.as_millis() / interval_ms) as usize
    }
}

/// One OHLCV bar. Timestamps serialize as epoch milliseconds on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub interval: String,
    pub period: String,
    pub source: String,
}

impl Candle {
    /// Convert to a wire record. The symbol is the partition key, so every
    /// candle for one symbol lands on one shard in arrival order. That
    /// concentrates a symbol's throughput on a single shard; accepted as a
    /// known ceiling, not rehashed away.
    pub fn into_record(self) -> Record {
        let partition_key = self.symbol.clone();
        let event_time_millis = self.ts.timestamp_millis();
        let payload = match serde_json::to_value(&self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };

        Record {
            partition_key,
            event_time_millis,
            payload,
        }
    }
}

/// Source of candles for one symbol over one window. Implementations may
/// call out or use randomness but must not mutate external state; the caller
/// decides whether a failed fetch is retried (here: by the scheduler's next
/// tick, never within the same invocation).
#[async_trait]
pub trait CandleProvider: Send + Sync {
    async fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<Vec<Candle>, SourceError>;
}
