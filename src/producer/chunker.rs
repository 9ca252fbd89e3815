use crate::stream::{Record, MAX_CALL_BYTES, MAX_CHUNK_RECORDS};

/// Per-call limits a chunk must satisfy.
#[derive(Debug, Clone)]
pub struct ChunkLimits {
    pub max_records: usize,
    pub max_call_bytes: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_records: MAX_CHUNK_RECORDS,
            max_call_bytes: MAX_CALL_BYTES,
        }
    }
}

/// Split `records` into contiguous chunks, each at most `max_records` long
/// and `max_call_bytes` heavy. Greedy first-fit forward scan: a chunk closes
/// when full or when the next record would push it over the byte limit.
/// Input order is preserved exactly; records are never regrouped by key.
///
/// Callers must reject records larger than the per-record cap beforehand;
/// a single conforming record always fits an empty chunk.
pub fn chunk_records(records: Vec<Record>, limits: &ChunkLimits) -> Vec<Vec<Record>> {
    let mut chunks = Vec::new();
    let mut current: Vec<Record> = Vec::new();
    let mut current_bytes = 0usize;

    for record in records {
        let size = record.serialized_size();
        let over_count = current.len() >= limits.max_records;
        let over_bytes = !current.is_empty() && current_bytes + size > limits.max_call_bytes;

        if over_count || over_bytes {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }

        current_bytes += size;
        current.push(record);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
