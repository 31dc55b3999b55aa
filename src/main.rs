use anyhow::Context;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use cdc_dispatch::batch::Batch;
use cdc_dispatch::kafka::KafkaSender;
use cdc_dispatch::{CompletionCallback, Config, DispatchOutcome, Dispatcher};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "cdc-dispatch")]
#[command(about = "Partitioned CDC batch dispatcher for Kafka", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

struct LogCallback {
    batch_id: i64,
}

impl CompletionCallback for LogCallback {
    fn commit(&self) {
        info!(batch_id = self.batch_id, "batch committed");
    }

    fn rollback(&self) {
        warn!(batch_id = self.batch_id, "batch rolled back");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting cdc-dispatch");
    info!("Loading configuration from {:?}", args.config);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_client_id = %config.kafka.client_id,
        topic = %config.destination.topic,
        flat_message = config.dispatch.flat_message,
        "Configuration summary"
    );

    let sender = Arc::new(KafkaSender::new(&config.kafka).context("failed to start producer")?);
    let dispatcher = Dispatcher::new(Arc::clone(&sender), &config.dispatch);

    // One base64-encoded wire batch per stdin line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id: i64 = 1;
    let mut committed = 0u64;
    let mut rolled_back = 0u64;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let payload = match BASE64_STANDARD.decode(line) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                error!(error = %e, "skipping line that is not valid base64");
                continue;
            }
        };

        let batch = Batch::new(next_id, payload);
        let callback = LogCallback { batch_id: next_id };
        next_id += 1;

        match dispatcher
            .send(batch, &config.destination, &callback)
            .await
        {
            DispatchOutcome::Committed { .. } => committed += 1,
            DispatchOutcome::RolledBack => rolled_back += 1,
        }
    }

    info!(committed, rolled_back, "input exhausted, shutting down");
    sender.stop().context("failed to flush producer")?;
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("cdc_dispatch=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("cdc_dispatch=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
