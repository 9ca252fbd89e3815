use crate::stream::{
    PutBatchResponse, PutErrorKind, PutOutcome, Record, StreamTransport, TransportError,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// Behavior applied to the next `put_batch` call. When the script queue is
/// empty every record is accepted.
#[derive(Debug, Clone)]
pub enum ScriptedCall {
    /// Fail the whole call before any record is examined.
    CallError(ScriptedError),
    /// Accept all records except those whose partition key is listed, which
    /// come back throttled.
    ThrottleKeys(HashSet<String>),
    /// Accept all records except those whose partition key is listed, which
    /// come back rejected.
    RejectKeys(HashSet<String>),
}

#[derive(Debug, Clone, Copy)]
pub enum ScriptedError {
    Throttled,
    AccessDenied,
    StreamNotFound,
    Timeout,
}

impl ScriptedError {
    fn into_transport_error(self, stream: &str) -> TransportError {
        match self {
            ScriptedError::Throttled => {
                TransportError::Throttled("write capacity exceeded".to_string())
            }
            ScriptedError::AccessDenied => {
                TransportError::AccessDenied("not authorized".to_string())
            }
            ScriptedError::StreamNotFound => TransportError::StreamNotFound(stream.to_string()),
            ScriptedError::Timeout => TransportError::Timeout,
        }
    }
}

/// In-memory stream transport. Accepts everything by default, which makes it
/// usable for local runs; tests script call-level errors and per-record
/// outcomes, then assert on the recorded calls and acceptance order.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    calls: Mutex<Vec<RecordedCall>>,
    accepted: Mutex<Vec<Record>>,
    script: Mutex<VecDeque<ScriptedCall>>,
    next_sequence: Mutex<u64>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub stream: String,
    pub records: Vec<Record>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a behavior for the next unscripted call.
    pub fn push_script(&self, call: ScriptedCall) {
        self.script.lock().unwrap().push_back(call);
    }

    /// Every `put_batch` invocation observed, in order, including failed ones.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Records acknowledged as accepted, in acceptance order.
    pub fn accepted(&self) -> Vec<Record> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamTransport for MemoryTransport {
    async fn put_batch(
        &self,
        stream: &str,
        records: &[Record],
    ) -> Result<PutBatchResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            stream: stream.to_string(),
            records: records.to_vec(),
        });

        let scripted = self.script.lock().unwrap().pop_front();
        let (throttle_keys, reject_keys) = match scripted {
            Some(ScriptedCall::CallError(err)) => return Err(err.into_transport_error(stream)),
            Some(ScriptedCall::ThrottleKeys(keys)) => (keys, HashSet::new()),
            Some(ScriptedCall::RejectKeys(keys)) => (HashSet::new(), keys),
            None => (HashSet::new(), HashSet::new()),
        };

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if throttle_keys.contains(&record.partition_key) {
                outcomes.push(PutOutcome::Err {
                    kind: PutErrorKind::Throttled,
                    message: "shard capacity exceeded".to_string(),
                });
            } else if reject_keys.contains(&record.partition_key) {
                outcomes.push(PutOutcome::Err {
                    kind: PutErrorKind::Rejected,
                    message: "record rejected".to_string(),
                });
            } else {
                let mut next = self.next_sequence.lock().unwrap();
                *next += 1;
                self.accepted.lock().unwrap().push(record.clone());
                outcomes.push(PutOutcome::Ok {
                    sequence_number: next.to_string(),
                });
            }
        }

        Ok(PutBatchResponse { outcomes })
    }
}
