//! Broker sender: the narrow delivery interface and its Kafka
//! implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::{Error, Result};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts one serialized message bound for a specific topic and
/// partition index. Implementations do not retry beyond whatever their
/// client is configured with at construction time.
#[async_trait]
pub trait BrokerSender: Send + Sync + 'static {
    async fn send_to_partition(&self, topic: &str, payload: &[u8], partition: usize)
        -> Result<()>;
}

/// Maps a computed partition index onto the live queue count.
///
/// When the live count is smaller than the index, the index wraps modulo
/// the count instead of failing, tolerating partition-count drift
/// between destination config and broker topology. The boundary is
/// strictly greater-than; downstream consumers may depend on the exact
/// wrap values, so it is preserved as observed.
pub(crate) fn resolve_partition(partition: usize, queue_count: usize) -> usize {
    if queue_count > 0 && partition > queue_count {
        partition % queue_count
    } else {
        partition
    }
}

pub struct KafkaSender {
    producer: FutureProducer,
    namespace: Option<String>,
    partition_counts: Mutex<HashMap<String, usize>>,
}

impl KafkaSender {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("client.id", &config.client_id)
            .set("message.send.max.retries", config.retries.to_string())
            .set("message.timeout.ms", config.message_timeout_ms.to_string());

        if let Some(sasl) = &config.sasl {
            client_config
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanism", &sasl.mechanism)
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }
        if config.enable_trace {
            client_config.set("debug", "msg");
        }

        let producer: FutureProducer = client_config.create().map_err(Error::Kafka)?;
        info!(client_id = %config.client_id, "Kafka producer started");

        Ok(Self {
            producer,
            namespace: config.namespace.clone(),
            partition_counts: Mutex::new(HashMap::new()),
        })
    }

    /// Flushes outstanding sends. Called once when the producer is being
    /// shut down.
    pub fn stop(&self) -> Result<()> {
        info!("Stopping Kafka producer");
        self.producer
            .flush(Duration::from_secs(30))
            .map_err(Error::Kafka)
    }

    fn full_topic(&self, topic: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}.{}", namespace, topic),
            None => topic.to_string(),
        }
    }

    /// Live partition count for a topic, cached after the first lookup.
    fn queue_count(&self, topic: &str) -> Option<usize> {
        {
            let counts = self.partition_counts.lock().ok()?;
            if let Some(&count) = counts.get(topic) {
                return Some(count);
            }
        }

        let metadata = match self
            .producer
            .client()
            .fetch_metadata(Some(topic), METADATA_TIMEOUT)
        {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(topic, error = %e, "failed to fetch topic metadata");
                return None;
            }
        };

        let count = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic)
            .map(|t| t.partitions().len())
            .filter(|&count| count > 0)?;

        if let Ok(mut counts) = self.partition_counts.lock() {
            counts.insert(topic.to_string(), count);
        }
        Some(count)
    }
}

#[async_trait]
impl BrokerSender for KafkaSender {
    async fn send_to_partition(
        &self,
        topic: &str,
        payload: &[u8],
        partition: usize,
    ) -> Result<()> {
        let topic = self.full_topic(topic);
        let partition = match self.queue_count(&topic) {
            Some(count) => resolve_partition(partition, count),
            None => partition,
        };

        let record = FutureRecord::<(), _>::to(&topic)
            .payload(payload)
            .partition(partition as i32);

        let (delivered_partition, offset) = self
            .producer
            .send(record, rdkafka::util::Timeout::Never)
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        debug!(
            topic = %topic,
            partition = delivered_partition,
            offset,
            "message delivered"
        );
        Ok(())
    }
}
