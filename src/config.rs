use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub dispatch: DispatchConfig,
    pub destination: Destination,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    /// Producer identity, mapped to the client id.
    pub client_id: String,
    /// Optional namespace prepended to every outgoing topic.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub sasl: Option<SaslConfig>,
    /// Send retries handled by the broker client, not by the dispatcher.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Enables librdkafka message tracing output.
    #[serde(default)]
    pub enable_trace: bool,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SaslConfig {
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Selects the flattened per-row payload shape instead of the raw
    /// binary transaction-log format. Applies to the whole producer.
    #[serde(default)]
    pub flat_message: bool,
    /// Drops transaction begin/end marker entries from raw payloads.
    #[serde(default)]
    pub filter_transaction_entry: bool,
    /// Bound on concurrently running dispatch units across all calls.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flat_message: false,
            filter_transaction_entry: false,
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Where a batch's records go: a static topic plus optional dynamic-topic
/// and partition-key expressions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Destination {
    pub topic: String,
    /// Template with `{schema}` / `{table}` placeholders; absent means a
    /// single static topic.
    #[serde(default)]
    pub dynamic_topic_expression: Option<String>,
    /// Comma-separated key column names; absent means no sharding.
    #[serde(default)]
    pub partition_key_expression: Option<String>,
    /// Target partition count for sharding.
    #[serde(default)]
    pub partitions_num: Option<i32>,
    /// Fixed partition index used when sharding is disabled.
    #[serde(default)]
    pub partition: Option<i32>,
}

impl Destination {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            dynamic_topic_expression: None,
            partition_key_expression: None,
            partitions_num: None,
            partition: None,
        }
    }

    /// The partition index used on the no-sharding path, default 0.
    pub fn fixed_partition(&self) -> usize {
        self.partition.filter(|p| *p >= 0).unwrap_or(0) as usize
    }

    pub fn key_expression(&self) -> &str {
        self.partition_key_expression.as_deref().unwrap_or("")
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("CDC_DISPATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

fn default_retries() -> u32 {
    2
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_max_in_flight() -> usize {
    8
}
