pub mod chunker;
pub mod writer;

pub use chunker::{chunk_records, ChunkLimits};
pub use writer::{BatchWriter, RetryPolicy, WriteError, WriterConfig};

use crate::stream::{PutErrorKind, Record, TransportError};
use serde::Serialize;

/// Why a record ended up in the failed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorKind {
    /// Capacity retries were exhausted.
    Throttled,
    /// Malformed or oversized record; never sent or sent and refused.
    Rejected,
    /// The stream refused the caller's credentials.
    AccessDenied,
    /// The stream service failed in a way retries could not absorb.
    Unavailable,
}

impl From<PutErrorKind> for WriteErrorKind {
    fn from(kind: PutErrorKind) -> Self {
        match kind {
            PutErrorKind::Throttled => WriteErrorKind::Throttled,
            PutErrorKind::Rejected => WriteErrorKind::Rejected,
            PutErrorKind::AccessDenied => WriteErrorKind::AccessDenied,
            PutErrorKind::Internal => WriteErrorKind::Unavailable,
        }
    }
}

impl From<&TransportError> for WriteErrorKind {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::Throttled(_) | TransportError::Timeout => WriteErrorKind::Throttled,
            TransportError::AccessDenied(_) => WriteErrorKind::AccessDenied,
            TransportError::StreamNotFound(_)
            | TransportError::Http(_)
            | TransportError::Service { .. } => WriteErrorKind::Unavailable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailedRecord {
    pub record: Record,
    pub kind: WriteErrorKind,
    pub reason: String,
}

/// Full accounting for one `write` call: every input record is counted in
/// `accepted` or present in `failed`, exactly once. At-least-once contract:
/// a retry after a lost acknowledgment can deliver a record twice to the
/// stream, but the report itself never double-counts.
#[derive(Debug, Default)]
pub struct WriteReport {
    pub accepted: usize,
    pub failed: Vec<FailedRecord>,
}

impl WriteReport {
    pub fn total(&self) -> usize {
        self.accepted + self.failed.len()
    }

    pub fn all_accepted(&self) -> bool {
        self.failed.is_empty()
    }

    pub(crate) fn fail(&mut self, record: Record, kind: WriteErrorKind, reason: impl Into<String>) {
        self.failed.push(FailedRecord {
            record,
            kind,
            reason: reason.into(),
        });
    }
}
