use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of captured database changes handed to the dispatcher.
///
/// The payload is a stream of length-prefixed wire-encoded transaction-log
/// entries (see [`crate::batch::wire`]). A batch is owned exclusively by
/// one `send` call and discarded after commit or rollback.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: i64,
    pub payload: Bytes,
}

impl Batch {
    pub fn new(id: i64, payload: Bytes) -> Self {
        Self { id, payload }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One decoded row mutation with before/after column images.
///
/// Records are immutable once produced by the extractor; their relative
/// order within a batch is the original transaction-log order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChangeRecord {
    pub batch_id: i64,
    pub schema: String,
    pub table: String,
    pub op: ChangeOp,
    pub ts_ms: i64,
    pub before: Vec<Column>,
    pub after: Vec<Column>,
}

/// A single column image with enough metadata to re-encode losslessly.
/// `value: None` means SQL NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub sql_type: i32,
    pub is_key: bool,
    pub value: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: i32, is_key: bool, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            sql_type,
            is_key,
            value: value.map(str::to_string),
        }
    }
}

/// Flattened per-row representation for consumer-friendly payloads.
///
/// Nulls are emitted explicitly: a NULL column appears in the map with a
/// JSON `null` value, and an absent image serializes as `null` rather
/// than being skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatMessage {
    pub id: i64,
    pub database: String,
    pub table: String,
    #[serde(rename = "type")]
    pub op: ChangeOp,
    pub ts_ms: i64,
    pub before: Option<Map<String, Value>>,
    pub after: Option<Map<String, Value>>,
}

fn image_to_map(columns: &[Column]) -> Option<Map<String, Value>> {
    if columns.is_empty() {
        return None;
    }
    let mut map = Map::new();
    for column in columns {
        let value = match &column.value {
            Some(v) => Value::String(v.clone()),
            None => Value::Null,
        };
        map.insert(column.name.clone(), value);
    }
    Some(map)
}

impl FlatMessage {
    pub fn from_record(record: &RowChangeRecord) -> Self {
        Self {
            id: record.batch_id,
            database: record.schema.clone(),
            table: record.table.clone(),
            op: record.op,
            ts_ms: record.ts_ms,
            before: image_to_map(&record.before),
            after: image_to_map(&record.after),
        }
    }
}
