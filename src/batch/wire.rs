//! Native binary transaction-log wire format.
//!
//! A batch payload is a sequence of entry frames, each prefixed with a
//! big-endian `u32` length. An entry is either a transaction marker
//! (begin/end) or a row change carrying full column metadata, so a
//! decoded row can be re-encoded without loss.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::types::{Batch, ChangeOp, Column, RowChangeRecord};
use crate::{Error, Result};

const KIND_TRANSACTION_BEGIN: u8 = 0;
const KIND_TRANSACTION_END: u8 = 1;
const KIND_ROW_DATA: u8 = 2;

const OP_INSERT: u8 = 0;
const OP_UPDATE: u8 = 1;
const OP_DELETE: u8 = 2;

const FLAG_KEY: u8 = 0x01;
const FLAG_NULL: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    TransactionBegin,
    TransactionEnd,
    RowData,
}

fn decode_error(message: impl Into<String>) -> Error {
    Error::Decode {
        message: message.into(),
    }
}

/// Splits a batch payload into its entry frames, validating the length
/// prefixes. Frame contents are not decoded.
pub fn split_frames(payload: &Bytes) -> Result<Vec<Bytes>> {
    let mut frames = Vec::new();
    let mut offset = 0usize;

    while offset < payload.len() {
        if payload.len() - offset < 4 {
            return Err(decode_error("truncated frame length prefix"));
        }
        let len = u32::from_be_bytes([
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ]) as usize;
        offset += 4;

        if payload.len() - offset < len {
            return Err(decode_error(format!(
                "frame length {} exceeds remaining payload {}",
                len,
                payload.len() - offset
            )));
        }
        if len == 0 {
            return Err(decode_error("empty entry frame"));
        }
        frames.push(payload.slice(offset..offset + len));
        offset += len;
    }

    Ok(frames)
}

/// Reads the entry kind from a frame without decoding the body.
pub fn frame_kind(frame: &[u8]) -> Result<EntryKind> {
    match frame.first() {
        Some(&KIND_TRANSACTION_BEGIN) => Ok(EntryKind::TransactionBegin),
        Some(&KIND_TRANSACTION_END) => Ok(EntryKind::TransactionEnd),
        Some(&KIND_ROW_DATA) => Ok(EntryKind::RowData),
        Some(&other) => Err(decode_error(format!("unknown entry kind: {}", other))),
        None => Err(decode_error("empty entry frame")),
    }
}

/// Decodes one entry frame into a row-change record.
///
/// Returns `None` for transaction markers. Trailing bytes after a fully
/// decoded entry are rejected.
pub fn decode_record(frame: &Bytes, batch_id: i64) -> Result<Option<RowChangeRecord>> {
    let kind = frame_kind(frame)?;
    let mut cursor = &frame[1..];

    if cursor.remaining() < 8 {
        return Err(decode_error("truncated entry timestamp"));
    }
    let ts_ms = cursor.get_i64();
    let schema = read_string(&mut cursor, "schema name")?;
    let table = read_string(&mut cursor, "table name")?;

    let record = match kind {
        EntryKind::TransactionBegin | EntryKind::TransactionEnd => None,
        EntryKind::RowData => {
            if cursor.remaining() < 1 {
                return Err(decode_error("truncated row operation"));
            }
            let op = match cursor.get_u8() {
                OP_INSERT => ChangeOp::Insert,
                OP_UPDATE => ChangeOp::Update,
                OP_DELETE => ChangeOp::Delete,
                other => {
                    return Err(decode_error(format!("unknown row operation: {}", other)));
                }
            };
            let before = read_columns(&mut cursor)?;
            let after = read_columns(&mut cursor)?;

            Some(RowChangeRecord {
                batch_id,
                schema,
                table,
                op,
                ts_ms,
                before,
                after,
            })
        }
    };

    if cursor.has_remaining() {
        return Err(decode_error(format!(
            "{} trailing bytes after entry",
            cursor.remaining()
        )));
    }

    Ok(record)
}

fn read_string(cursor: &mut &[u8], what: &str) -> Result<String> {
    if cursor.remaining() < 2 {
        return Err(decode_error(format!("truncated {} length", what)));
    }
    let len = cursor.get_u16() as usize;
    if cursor.remaining() < len {
        return Err(decode_error(format!("truncated {}", what)));
    }
    let raw = cursor.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| decode_error(format!("{} is not valid UTF-8", what)))
}

fn read_columns(cursor: &mut &[u8]) -> Result<Vec<Column>> {
    if cursor.remaining() < 2 {
        return Err(decode_error("truncated column count"));
    }
    let count = cursor.get_u16() as usize;
    let mut columns = Vec::with_capacity(count);

    for _ in 0..count {
        let name = read_string(cursor, "column name")?;
        if cursor.remaining() < 5 {
            return Err(decode_error("truncated column metadata"));
        }
        let sql_type = cursor.get_i32();
        let flags = cursor.get_u8();
        let value = if flags & FLAG_NULL != 0 {
            None
        } else {
            if cursor.remaining() < 4 {
                return Err(decode_error("truncated column value length"));
            }
            let len = cursor.get_u32() as usize;
            if cursor.remaining() < len {
                return Err(decode_error("truncated column value"));
            }
            let raw = cursor.copy_to_bytes(len);
            Some(
                String::from_utf8(raw.to_vec())
                    .map_err(|_| decode_error("column value is not valid UTF-8"))?,
            )
        };
        columns.push(Column {
            name,
            sql_type,
            is_key: flags & FLAG_KEY != 0,
            value,
        });
    }

    Ok(columns)
}

/// Incrementally builds a batch payload from markers and row records.
#[derive(Debug, Default)]
pub struct BatchEncoder {
    buf: BytesMut,
}

impl BatchEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_begin(&mut self, ts_ms: i64) -> &mut Self {
        self.marker(KIND_TRANSACTION_BEGIN, ts_ms);
        self
    }

    pub fn transaction_end(&mut self, ts_ms: i64) -> &mut Self {
        self.marker(KIND_TRANSACTION_END, ts_ms);
        self
    }

    pub fn row(&mut self, record: &RowChangeRecord) -> &mut Self {
        let mut entry = BytesMut::new();
        entry.put_u8(KIND_ROW_DATA);
        entry.put_i64(record.ts_ms);
        put_string(&mut entry, &record.schema);
        put_string(&mut entry, &record.table);
        entry.put_u8(match record.op {
            ChangeOp::Insert => OP_INSERT,
            ChangeOp::Update => OP_UPDATE,
            ChangeOp::Delete => OP_DELETE,
        });
        put_columns(&mut entry, &record.before);
        put_columns(&mut entry, &record.after);
        self.frame(entry);
        self
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn into_batch(self, id: i64) -> Batch {
        Batch::new(id, self.finish())
    }

    fn marker(&mut self, kind: u8, ts_ms: i64) {
        let mut entry = BytesMut::new();
        entry.put_u8(kind);
        entry.put_i64(ts_ms);
        put_string(&mut entry, "");
        put_string(&mut entry, "");
        self.frame(entry);
    }

    fn frame(&mut self, entry: BytesMut) {
        self.buf.put_u32(entry.len() as u32);
        self.buf.extend_from_slice(&entry);
    }
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.extend_from_slice(value.as_bytes());
}

fn put_columns(buf: &mut BytesMut, columns: &[Column]) {
    buf.put_u16(columns.len() as u16);
    for column in columns {
        put_string(buf, &column.name);
        buf.put_i32(column.sql_type);
        let mut flags = 0u8;
        if column.is_key {
            flags |= FLAG_KEY;
        }
        if column.value.is_none() {
            flags |= FLAG_NULL;
        }
        buf.put_u8(flags);
        if let Some(value) = &column.value {
            buf.put_u32(value.len() as u32);
            buf.extend_from_slice(value.as_bytes());
        }
    }
}

/// Re-encodes a sub-batch of row records into the wire format.
/// Deterministic: the same records always yield the same bytes.
pub fn encode_records(records: &[RowChangeRecord]) -> Bytes {
    let mut encoder = BatchEncoder::new();
    for record in records {
        encoder.row(record);
    }
    encoder.finish()
}

/// Drops transaction marker frames from a payload, leaving row frames
/// byte-identical. Row bodies are not decoded.
pub fn filter_transaction_frames(payload: &Bytes) -> Result<Bytes> {
    let frames = split_frames(payload)?;
    let mut buf = BytesMut::new();
    for frame in frames {
        if frame_kind(&frame)? == EntryKind::RowData {
            buf.put_u32(frame.len() as u32);
            buf.extend_from_slice(&frame);
        }
    }
    Ok(buf.freeze())
}
