//! Dispatch coordination: fan-out of one batch into concurrent dispatch
//! units and the single commit/rollback decision covering all of them.
//!
//! One `send` call decodes the batch, routes records to topics, shards
//! each topic group into partition sub-batches, and delivers every
//! resulting unit on a bounded worker pool. The call blocks at a join
//! barrier until every unit of the current fan-out step finishes, then
//! reports exactly one of `commit` or `rollback` to the caller.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::batch::{extract, Batch, RowChangeRecord};
use crate::config::{Destination, DispatchConfig};
use crate::kafka::producer::BrokerSender;
use crate::kafka::serializer::{EventSerializer, PayloadFormat, PayloadSource};
use crate::kafka::{partitioner, router};
use crate::{Error, Result};

/// Batch-level delivery decision reported to the caller. Exactly one of
/// the two is ever produced per `send` call; no partial success exists.
pub trait CompletionCallback: Send + Sync {
    /// The whole batch is durably queued and may be acknowledged.
    fn commit(&self);
    /// At least one unit failed; the batch must be re-driven.
    fn rollback(&self);
}

/// Aggregate result over all dispatch units of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Committed { units: usize },
    RolledBack,
}

/// One (topic, partition, payload) delivery. The whole value moves into
/// its worker task; tasks never borrow loop state.
struct DispatchUnit {
    topic: String,
    partition: usize,
    source: PayloadSource,
}

struct UnitReport {
    topic: String,
    partition: usize,
    result: Result<()>,
}

impl DispatchUnit {
    async fn run<S: BrokerSender>(self, sender: Arc<S>, serializer: EventSerializer) -> UnitReport {
        // A serialization failure is reported exactly like a send
        // failure.
        let result = match serializer.serialize(&self.source) {
            Ok(payload) => {
                sender
                    .send_to_partition(&self.topic, &payload, self.partition)
                    .await
            }
            Err(e) => Err(e),
        };

        UnitReport {
            topic: self.topic,
            partition: self.partition,
            result,
        }
    }
}

/// The dispatch coordinator. Owns the long-lived broker sender and a
/// bounded worker pool shared across all `send` calls.
pub struct Dispatcher<S> {
    sender: Arc<S>,
    serializer: EventSerializer,
    limiter: Arc<Semaphore>,
}

impl<S: BrokerSender> Dispatcher<S> {
    pub fn new(sender: Arc<S>, options: &DispatchConfig) -> Self {
        let format = if options.flat_message {
            PayloadFormat::Flat
        } else {
            PayloadFormat::Raw
        };
        Self {
            sender,
            serializer: EventSerializer::new(format, options.filter_transaction_entry),
            limiter: Arc::new(Semaphore::new(options.max_in_flight.max(1))),
        }
    }

    /// Dispatches one batch and resolves it with exactly one of
    /// `callback.commit()` or `callback.rollback()`.
    pub async fn send(
        &self,
        batch: Batch,
        destination: &Destination,
        callback: &dyn CompletionCallback,
    ) -> DispatchOutcome {
        let batch_id = batch.id;

        match self.dispatch(batch, destination).await {
            Ok(units) => {
                debug!(batch_id, units, "batch dispatched");
                callback.commit();
                DispatchOutcome::Committed { units }
            }
            Err(e) => {
                info!(batch_id, error = %e, "rolling back batch");
                callback.rollback();
                DispatchOutcome::RolledBack
            }
        }
    }

    async fn dispatch(&self, batch: Batch, destination: &Destination) -> Result<usize> {
        let batch = Arc::new(batch);
        let records = match extract(&batch).await {
            Ok(records) => records,
            Err(e) => {
                error!(batch_id = batch.id, error = %e, "failed to decode batch");
                return Err(e);
            }
        };

        let mut total_units = 0;
        let mut first_error: Option<Error> = None;

        // Dynamic topics dispatch one group at a time; each group is
        // fully awaited before the next starts, and every group is still
        // attempted after a failure so the rollback covers an attempt of
        // the whole batch.
        for (topic, group) in router::route(records, destination) {
            let units = self.build_units(&batch, destination, topic, group);
            total_units += units.len();

            let mut tasks: JoinSet<UnitReport> = JoinSet::new();
            for unit in units {
                let permit = self
                    .limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore is never closed");
                let sender = Arc::clone(&self.sender);
                let serializer = self.serializer;
                tasks.spawn(async move {
                    let _permit = permit;
                    unit.run(sender, serializer).await
                });
            }

            // Join barrier: every unit is awaited, even after a failure,
            // so the caller decides on the complete picture. The task
            // group is fully drained before the next topic starts.
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(report) => {
                        if let Err(e) = report.result {
                            error!(
                                batch_id = batch.id,
                                topic = %report.topic,
                                partition = report.partition,
                                error = %e,
                                "dispatch unit failed"
                            );
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                    Err(join_error) => {
                        error!(
                            batch_id = batch.id,
                            error = %join_error,
                            "dispatch unit task did not complete"
                        );
                        if first_error.is_none() {
                            first_error = Some(Error::Task(join_error));
                        }
                    }
                }
            }
        }

        match first_error {
            None => Ok(total_units),
            Some(e) => Err(e),
        }
    }

    fn build_units(
        &self,
        batch: &Arc<Batch>,
        destination: &Destination,
        topic: String,
        records: Vec<RowChangeRecord>,
    ) -> Vec<DispatchUnit> {
        let fixed_partition = destination.fixed_partition();
        let key_expression = destination.key_expression();

        if !key_expression.is_empty() {
            return partitioner::assign(
                records,
                key_expression,
                destination.partitions_num.unwrap_or(0),
                fixed_partition,
            )
            .into_iter()
            .map(|(partition, group)| DispatchUnit {
                topic: topic.clone(),
                partition,
                source: PayloadSource::Records(group),
            })
            .collect();
        }

        // Unsharded: one unit for the whole group. The static-topic raw
        // path ships the original batch payload (markers included);
        // routed or flattened groups ship the record sub-batch.
        let whole_batch = self.serializer.format() == PayloadFormat::Raw
            && destination.dynamic_topic_expression.is_none();
        let source = if whole_batch {
            PayloadSource::Batch(Arc::clone(batch))
        } else {
            if records.is_empty() {
                return Vec::new();
            }
            PayloadSource::Records(records)
        };

        vec![DispatchUnit {
            topic,
            partition: fixed_partition,
            source,
        }]
    }
}
