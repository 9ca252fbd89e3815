pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{MemoryTransport, RecordedCall, ScriptedCall, ScriptedError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Service-imposed cap on records per `put_batch` call.
pub const MAX_CHUNK_RECORDS: usize = 500;

/// Service-imposed cap on the cumulative serialized size of one call.
pub const MAX_CALL_BYTES: usize = 5 * 1024 * 1024;

/// Service-imposed cap on one record's serialized size.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("stream `{0}` not found")]
    StreamNotFound(String),

    #[error("write capacity exceeded: {0}")]
    Throttled(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("request timed out")]
    Timeout,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream service returned status {status}: {message}")]
    Service { status: u16, message: String },
}

impl TransportError {
    /// Whether a fresh attempt at the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Throttled(_) | TransportError::Timeout)
    }
}

/// One wire record bound for the stream. The partition key routes the record
/// to a shard; the stream orders records sharing a key by arrival sequence,
/// so the writer must never reorder records within a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub partition_key: String,
    pub event_time_millis: i64,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Record {
    /// Serialized size as the service meters it: payload bytes plus the
    /// partition key. An unserializable payload counts as oversized.
    pub fn serialized_size(&self) -> usize {
        let payload_len = serde_json::to_vec(&self.payload)
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX);
        payload_len.saturating_add(self.partition_key.len())
    }
}

/// Per-record failure classification reported by the stream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutErrorKind {
    /// Shard capacity exceeded; the record may be retried.
    Throttled,
    /// Malformed or oversized record; retrying cannot help.
    Rejected,
    /// Caller lacks write permission on the stream.
    AccessDenied,
    /// Transient service-side failure; the record may be retried.
    Internal,
}

impl PutErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, PutErrorKind::Throttled | PutErrorKind::Internal)
    }
}

/// Per-record result within an otherwise-successful `put_batch` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PutOutcome {
    Ok { sequence_number: String },
    Err { kind: PutErrorKind, message: String },
}

impl PutOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, PutOutcome::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutBatchResponse {
    /// One outcome per submitted record, in submission order.
    pub outcomes: Vec<PutOutcome>,
}

/// Client for the external append-only stream service. The service owns
/// shard assignment, retention, and encryption at rest; callers see only a
/// capacity-bounded, occasionally-throttling batch write.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn put_batch(
        &self,
        stream: &str,
        records: &[Record],
    ) -> Result<PutBatchResponse, TransportError>;
}
