use crate::producer::chunker::{chunk_records, ChunkLimits};
use crate::producer::{WriteErrorKind, WriteReport};
use crate::stream::{PutOutcome, Record, StreamTransport, MAX_RECORD_BYTES};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("stream name is not configured")]
    UnconfiguredStream,
}

/// Bounded exponential backoff for throttled chunk writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub stream_name: String,
    pub dry_run: bool,
    pub limits: ChunkLimits,
    pub retry: RetryPolicy,
}

/// Writes bursts of records to the stream without violating per-call limits
/// or reordering records within a partition key. Chunks are dispatched
/// strictly sequentially; the stream's own per-key ordering does the rest.
pub struct BatchWriter {
    transport: Arc<dyn StreamTransport>,
    config: WriterConfig,
}

impl BatchWriter {
    pub fn new(transport: Arc<dyn StreamTransport>, config: WriterConfig) -> Self {
        Self { transport, config }
    }

    /// Write `records`, returning a report that accounts for every input
    /// record. Records invalid on their face (empty partition key,
    /// oversized) are reported rejected without any network attempt.
    pub async fn write(&self, records: Vec<Record>) -> Result<WriteReport, WriteError> {
        if self.config.stream_name.trim().is_empty() {
            return Err(WriteError::UnconfiguredStream);
        }

        let mut report = WriteReport::default();
        let mut sendable = Vec::with_capacity(records.len());
        for record in records {
            if record.partition_key.is_empty() {
                report.fail(record, WriteErrorKind::Rejected, "empty partition key");
            } else if record.serialized_size() > MAX_RECORD_BYTES {
                report.fail(record, WriteErrorKind::Rejected, "record exceeds size limit");
            } else {
                sendable.push(record);
            }
        }

        if self.config.dry_run {
            report.accepted += sendable.len();
            info!(
                stream = %self.config.stream_name,
                accepted = report.accepted,
                "Dry run, skipping stream write"
            );
            return Ok(report);
        }

        let chunks = chunk_records(sendable, &self.config.limits);
        let total_chunks = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            debug!(
                stream = %self.config.stream_name,
                chunk = index + 1,
                total_chunks,
                records = chunk.len(),
                "Writing chunk"
            );
            self.write_chunk(chunk, &mut report).await;
        }

        Ok(report)
    }

    /// One chunk, retried on throttling with backoff and jitter. Per-record
    /// throttles retry only the affected records, in their original relative
    /// order; terminal failures land in the report immediately.
    async fn write_chunk(&self, chunk: Vec<Record>, report: &mut WriteReport) {
        let mut pending = chunk;
        let mut backoff = self.config.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self
                .transport
                .put_batch(&self.config.stream_name, &pending)
                .await
            {
                Ok(response) => {
                    if response.outcomes.len() != pending.len() {
                        warn!(
                            stream = %self.config.stream_name,
                            sent = pending.len(),
                            returned = response.outcomes.len(),
                            "Stream returned mismatched outcome count, abandoning chunk"
                        );
                        for record in pending {
                            report.fail(
                                record,
                                WriteErrorKind::Unavailable,
                                "mismatched outcome count",
                            );
                        }
                        return;
                    }

                    let mut retryable = Vec::new();
                    for (record, outcome) in pending.into_iter().zip(response.outcomes) {
                        match outcome {
                            PutOutcome::Ok { .. } => report.accepted += 1,
                            PutOutcome::Err { kind, message } => {
                                if kind.is_retryable() {
                                    retryable.push(record);
                                } else {
                                    report.fail(record, kind.into(), message);
                                }
                            }
                        }
                    }

                    if retryable.is_empty() {
                        return;
                    }
                    if attempt >= self.config.retry.max_attempts {
                        for record in retryable {
                            report.fail(record, WriteErrorKind::Throttled, "retries exhausted");
                        }
                        return;
                    }
                    warn!(
                        stream = %self.config.stream_name,
                        attempt,
                        throttled = retryable.len(),
                        "Records throttled, retrying"
                    );
                    pending = retryable;
                }
                Err(error) if error.is_retryable() && attempt < self.config.retry.max_attempts => {
                    warn!(
                        stream = %self.config.stream_name,
                        attempt,
                        error = %error,
                        "Chunk write failed, retrying"
                    );
                }
                Err(error) => {
                    let kind = WriteErrorKind::from(&error);
                    warn!(
                        stream = %self.config.stream_name,
                        attempt,
                        error = %error,
                        "Chunk write failed terminally, abandoning chunk"
                    );
                    let reason = error.to_string();
                    for record in pending {
                        report.fail(record, kind, reason.clone());
                    }
                    return;
                }
            }

            tokio::time::sleep(with_jitter(backoff)).await;
            backoff = std::cmp::min(backoff * 2, self.config.retry.max_backoff);
            attempt += 1;
        }
    }
}

/// Equal jitter: half the backoff fixed, half uniformly random, so
/// concurrent throttled writers do not retry in lockstep.
fn with_jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let half = base / 2;
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}
