use async_trait::async_trait;
use cdc_dispatch::batch::{Batch, BatchEncoder, ChangeOp, Column, RowChangeRecord};
use cdc_dispatch::kafka::BrokerSender;
use cdc_dispatch::{CompletionCallback, Error, Result};
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub topic: String,
    pub partition: usize,
    pub payload: Vec<u8>,
}

/// In-process broker double: records every delivery attempt, can fail
/// selected (topic, partition) units, and tracks peak concurrency.
pub struct MockSender {
    sent: Mutex<Vec<SentMessage>>,
    fail_partitions: Vec<(String, usize)>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_partitions: Vec::new(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, topic: &str, partition: usize) -> Self {
        self.fail_partitions.push((topic.to_string(), partition));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every attempt, including the ones that failed.
    pub fn attempts(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerSender for MockSender {
    async fn send_to_partition(
        &self,
        topic: &str,
        payload: &[u8],
        partition: usize,
    ) -> Result<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.sent.lock().unwrap().push(SentMessage {
            topic: topic.to_string(),
            partition,
            payload: payload.to_vec(),
        });

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self
            .fail_partitions
            .iter()
            .any(|(t, p)| t == topic && *p == partition)
        {
            return Err(Error::Kafka(KafkaError::MessageProduction(
                RDKafkaErrorCode::QueueFull,
            )));
        }
        Ok(())
    }
}

/// Counts commit/rollback invocations so exactly-once resolution can be
/// asserted.
#[derive(Default)]
pub struct RecordingCallback {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

impl CompletionCallback for RecordingCallback {
    fn commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }

    fn rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn insert_record(schema: &str, table: &str, id: &str) -> RowChangeRecord {
    RowChangeRecord {
        batch_id: 0,
        schema: schema.to_string(),
        table: table.to_string(),
        op: ChangeOp::Insert,
        ts_ms: 1_700_000_000_000,
        before: Vec::new(),
        after: vec![
            Column::new("id", 4, true, Some(id)),
            Column::new("payload", 12, false, Some("x")),
        ],
    }
}

/// Encodes records between transaction markers, the shape a capture
/// source produces.
pub fn batch_of(id: i64, records: &[RowChangeRecord]) -> Batch {
    let mut encoder = BatchEncoder::new();
    encoder.transaction_begin(1);
    for record in records {
        encoder.row(record);
    }
    encoder.transaction_end(2);
    encoder.into_batch(id)
}
