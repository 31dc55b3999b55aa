#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::batch::{wire, BatchEncoder, ChangeOp, Column, FlatMessage, RowChangeRecord};
    use std::sync::Arc;

    fn test_record(op: ChangeOp) -> RowChangeRecord {
        let before = match op {
            ChangeOp::Insert => Vec::new(),
            _ => vec![
                Column::new("id", 4, true, Some("1")),
                Column::new("nickname", 12, false, Some("old")),
            ],
        };
        let after = match op {
            ChangeOp::Delete => Vec::new(),
            _ => vec![
                Column::new("id", 4, true, Some("1")),
                Column::new("nickname", 12, false, None),
            ],
        };

        RowChangeRecord {
            batch_id: 11,
            schema: "public".to_string(),
            table: "users".to_string(),
            op,
            ts_ms: 1234567890,
            before,
            after,
        }
    }

    #[test]
    fn test_flat_serialization_emits_explicit_nulls() {
        let serializer = EventSerializer::new(PayloadFormat::Flat, false);
        let source = PayloadSource::Records(vec![test_record(ChangeOp::Update)]);

        let payload = serializer.serialize(&source).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        let row = &parsed[0];
        assert_eq!(row["type"], "UPDATE");
        assert_eq!(row["database"], "public");
        // The NULL column is present with an explicit null, not omitted.
        assert!(row["after"].as_object().unwrap().contains_key("nickname"));
        assert!(row["after"]["nickname"].is_null());
    }

    #[test]
    fn test_flat_payload_round_trips_through_decoder() {
        let serializer = EventSerializer::new(PayloadFormat::Flat, false);
        let record = test_record(ChangeOp::Insert);
        let source = PayloadSource::Records(vec![record.clone()]);

        let payload = serializer.serialize(&source).unwrap();
        let messages: Vec<FlatMessage> = serde_json::from_slice(&payload).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, 11);
        assert_eq!(messages[0].table, "users");
        assert!(messages[0].before.is_none());
        let after = messages[0].after.as_ref().unwrap();
        assert_eq!(after["id"], "1");
        assert!(after["nickname"].is_null());
    }

    #[test]
    fn test_insert_absent_before_image_is_null() {
        let serializer = EventSerializer::new(PayloadFormat::Flat, false);
        let source = PayloadSource::Records(vec![test_record(ChangeOp::Insert)]);

        let payload = serializer.serialize(&source).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert!(parsed[0]["before"].is_null());
    }

    #[test]
    fn test_serialization_is_idempotent() {
        let records = vec![test_record(ChangeOp::Update), test_record(ChangeOp::Delete)];

        for serializer in [
            EventSerializer::new(PayloadFormat::Raw, false),
            EventSerializer::new(PayloadFormat::Flat, false),
        ] {
            let source = PayloadSource::Records(records.clone());
            let first = serializer.serialize(&source).unwrap();
            let second = serializer.serialize(&source).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_raw_records_round_trip() {
        let serializer = EventSerializer::new(PayloadFormat::Raw, false);
        let record = test_record(ChangeOp::Delete);
        let payload = serializer
            .serialize(&PayloadSource::Records(vec![record.clone()]))
            .unwrap();

        let frames = wire::split_frames(&payload).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(wire::decode_record(&frames[0], 11).unwrap().unwrap(), record);
    }

    #[test]
    fn test_raw_whole_batch_is_passthrough() {
        let mut encoder = BatchEncoder::new();
        encoder.transaction_begin(1);
        encoder.row(&test_record(ChangeOp::Insert));
        encoder.transaction_end(2);
        let batch = Arc::new(encoder.into_batch(11));

        let serializer = EventSerializer::new(PayloadFormat::Raw, false);
        let payload = serializer
            .serialize(&PayloadSource::Batch(Arc::clone(&batch)))
            .unwrap();
        assert_eq!(payload, batch.payload);
    }

    #[test]
    fn test_raw_whole_batch_filters_markers() {
        let record = test_record(ChangeOp::Insert);
        let mut encoder = BatchEncoder::new();
        encoder.transaction_begin(1);
        encoder.row(&record);
        encoder.transaction_end(2);
        let batch = Arc::new(encoder.into_batch(11));

        let serializer = EventSerializer::new(PayloadFormat::Raw, true);
        let payload = serializer
            .serialize(&PayloadSource::Batch(batch))
            .unwrap();
        assert_eq!(payload, wire::encode_records(std::slice::from_ref(&record)));
    }

    #[test]
    fn test_flat_whole_batch_decodes_rows() {
        let mut encoder = BatchEncoder::new();
        encoder.transaction_begin(1);
        encoder.row(&test_record(ChangeOp::Update));
        encoder.transaction_end(2);
        let batch = Arc::new(encoder.into_batch(11));

        let serializer = EventSerializer::new(PayloadFormat::Flat, false);
        let payload = serializer.serialize(&PayloadSource::Batch(batch)).unwrap();
        let messages: Vec<FlatMessage> = serde_json::from_slice(&payload).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].op, ChangeOp::Update);
    }
}
