//! Deterministic row-to-partition assignment.
//!
//! The partition key expression is a comma-separated list of column
//! names evaluated against a record's images. Identical key values must
//! land on the same partition across calls and process restarts, so the
//! hash is the Kafka-compatible murmur2 rather than anything
//! seed-randomized.

use tracing::{debug, warn};

use crate::batch::{ChangeOp, RowChangeRecord};

/// Kafka-compatible murmur2 hash (seed 0x9747b28c), matching the Java
/// client's `Utils.murmur2` so partition assignment agrees with other
/// producers of the same topic.
pub fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = SEED ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h
}

fn key_columns(expression: &str) -> Vec<&str> {
    expression
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

fn image_value<'a>(record: &'a RowChangeRecord, name: &str) -> Option<&'a str> {
    let lookup = |columns: &'a [crate::batch::Column]| {
        columns
            .iter()
            .find(|column| column.name == name)
            .and_then(|column| column.value.as_deref())
    };

    match record.op {
        ChangeOp::Delete => lookup(&record.before),
        ChangeOp::Insert => lookup(&record.after),
        // Updates read the post-image, falling back per column to the
        // pre-image.
        ChangeOp::Update => lookup(&record.after).or_else(|| lookup(&record.before)),
    }
}

fn record_key(record: &RowChangeRecord, columns: &[&str]) -> Option<String> {
    let mut parts = Vec::with_capacity(columns.len());
    for name in columns {
        match image_value(record, name) {
            Some(value) => parts.push(value),
            None => {
                debug!(
                    schema = %record.schema,
                    table = %record.table,
                    column = %name,
                    "partition key column missing from record"
                );
                return None;
            }
        }
    }
    Some(parts.join(":"))
}

/// Computes the partition index for one record. Records whose key cannot
/// be evaluated fall to partition 0.
pub fn partition_for(record: &RowChangeRecord, columns: &[&str], partition_count: usize) -> usize {
    match record_key(record, columns) {
        Some(key) => (murmur2(key.as_bytes()) & 0x7fff_ffff) as usize % partition_count,
        None => {
            warn!(
                schema = %record.schema,
                table = %record.table,
                "no partition key value, routing record to partition 0"
            );
            0
        }
    }
}

/// Groups records into ordered per-partition sub-batches.
///
/// Returns one entry per non-empty partition in ascending index order;
/// records within a partition keep their source order. An empty key
/// expression or a non-positive partition count yields a single group at
/// the fixed partition index.
pub fn assign(
    records: Vec<RowChangeRecord>,
    key_expression: &str,
    partitions_num: i32,
    fixed_partition: usize,
) -> Vec<(usize, Vec<RowChangeRecord>)> {
    if records.is_empty() {
        return Vec::new();
    }

    let columns = key_columns(key_expression);
    if columns.is_empty() || partitions_num <= 0 {
        return vec![(fixed_partition, records)];
    }

    let partition_count = partitions_num as usize;
    let mut buckets: Vec<Vec<RowChangeRecord>> = Vec::new();
    buckets.resize_with(partition_count, Vec::new);

    for record in records {
        let index = partition_for(&record, &columns, partition_count);
        buckets[index].push(record);
    }

    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, bucket)| !bucket.is_empty())
        .collect()
}
