//! Row extraction: decoding a batch payload into ordered row-change
//! records.
//!
//! Decoding cost scales with row count, so large batches are decoded in
//! parallel chunks on blocking worker threads. The returned sequence
//! always reconstructs the original transaction-log order; transaction
//! markers are skipped.

use bytes::Bytes;
use futures::future::try_join_all;
use tracing::trace;

use super::types::{Batch, RowChangeRecord};
use super::wire;
use crate::Result;

/// Batches at or below this frame count decode inline; the task overhead
/// is not worth it for small batches.
const INLINE_DECODE_LIMIT: usize = 32;

/// Decodes a batch payload into row-change records in log order.
///
/// Fails with [`crate::Error::Decode`] if any entry frame is malformed.
pub async fn extract(batch: &Batch) -> Result<Vec<RowChangeRecord>> {
    let frames = wire::split_frames(&batch.payload)?;
    trace!(batch_id = batch.id, frames = frames.len(), "extracting batch");

    if frames.len() <= INLINE_DECODE_LIMIT {
        return decode_frames(&frames, batch.id);
    }

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let chunk_size = frames.len().div_ceil(workers);

    let handles: Vec<_> = frames
        .chunks(chunk_size)
        .map(|chunk| {
            let chunk: Vec<Bytes> = chunk.to_vec();
            let batch_id = batch.id;
            tokio::task::spawn_blocking(move || decode_frames(&chunk, batch_id))
        })
        .collect();

    // try_join_all preserves chunk order, so concatenation reconstructs
    // the original log order.
    let chunks = try_join_all(handles).await?;
    let mut records = Vec::new();
    for chunk in chunks {
        records.extend(chunk?);
    }
    Ok(records)
}

fn decode_frames(frames: &[Bytes], batch_id: i64) -> Result<Vec<RowChangeRecord>> {
    let mut records = Vec::with_capacity(frames.len());
    for frame in frames {
        if let Some(record) = wire::decode_record(frame, batch_id)? {
            records.push(record);
        }
    }
    Ok(records)
}
