//! Payload serialization for dispatch units.
//!
//! Two wire shapes share one pipeline: the raw binary transaction-log
//! format (lossless, consumed by protocol-aware clients) and the
//! flattened per-row JSON format. Serialization is deterministic: the
//! same sub-batch always yields the same bytes.

use std::sync::Arc;

use bytes::Bytes;

use crate::batch::{wire, Batch, FlatMessage, RowChangeRecord};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Native binary transaction-log format.
    Raw,
    /// Flattened per-row JSON objects with explicit nulls.
    Flat,
}

/// What a dispatch unit serializes: the whole batch (static-topic
/// unpartitioned path) or a routed/partitioned sub-batch of records.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    Batch(Arc<Batch>),
    Records(Vec<RowChangeRecord>),
}

#[derive(Debug, Clone, Copy)]
pub struct EventSerializer {
    format: PayloadFormat,
    filter_transaction_entries: bool,
}

impl EventSerializer {
    pub fn new(format: PayloadFormat, filter_transaction_entries: bool) -> Self {
        Self {
            format,
            filter_transaction_entries,
        }
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn serialize(&self, source: &PayloadSource) -> Result<Bytes> {
        match (self.format, source) {
            (PayloadFormat::Raw, PayloadSource::Batch(batch)) => {
                if self.filter_transaction_entries {
                    wire::filter_transaction_frames(&batch.payload)
                } else {
                    Ok(batch.payload.clone())
                }
            }
            (PayloadFormat::Raw, PayloadSource::Records(records)) => {
                Ok(wire::encode_records(records))
            }
            (PayloadFormat::Flat, PayloadSource::Records(records)) => flatten(records),
            (PayloadFormat::Flat, PayloadSource::Batch(batch)) => {
                let frames = wire::split_frames(&batch.payload)?;
                let mut records = Vec::with_capacity(frames.len());
                for frame in &frames {
                    if let Some(record) = wire::decode_record(frame, batch.id)? {
                        records.push(record);
                    }
                }
                flatten(&records)
            }
        }
    }
}

fn flatten(records: &[RowChangeRecord]) -> Result<Bytes> {
    let messages: Vec<FlatMessage> = records.iter().map(FlatMessage::from_record).collect();
    let payload = serde_json::to_vec(&messages)?;
    Ok(Bytes::from(payload))
}
