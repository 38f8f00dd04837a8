use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use common_events::BrokerMetadata;
use futures_util::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{error, info, warn};

use crate::config::ConsumerConfig;
use crate::error::AckError;
use crate::message::InboundMessage;
use crate::worker::{Acknowledger, FlowControl, WorkerPool};

/// Manual-commit consumer; offsets move only after a batch is settled or dead-lettered.
pub fn consumer_config(cfg: &ConsumerConfig) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &cfg.kafka_bootstrap)
        .set("group.id", &cfg.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .set("max.poll.interval.ms", cfg.max_poll_interval_ms.to_string())
        .set("session.timeout.ms", cfg.session_timeout_ms.to_string());
    config
}

pub fn inbound_from(message: &BorrowedMessage<'_>) -> InboundMessage {
    InboundMessage {
        key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(|p| p.to_vec()).unwrap_or_default(),
        metadata: BrokerMetadata {
            partition: message.partition(),
            offset: message.offset(),
            timestamp_ms: message.timestamp().to_millis(),
        },
    }
}

pub struct KafkaAcknowledger {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaAcknowledger {
    pub fn new(consumer: Arc<StreamConsumer>, topic: impl Into<String>) -> Self {
        Self { consumer, topic: topic.into() }
    }
}

#[async_trait]
impl Acknowledger for KafkaAcknowledger {
    async fn ack(&self, partition: i32, offset: i64) -> Result<(), AckError> {
        let mut tpl = TopicPartitionList::new();
        // Committed offset is the next one to read.
        tpl.add_partition_offset(&self.topic, partition, Offset::Offset(offset + 1))
            .map_err(|e| AckError { partition, message: e.to_string() })?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| AckError { partition, message: e.to_string() })
    }
}

/// Pauses fetching for a partition whose worker has fallen behind. Anything already delivered
/// for it while paused still queues in order behind the high-water mark.
pub struct KafkaFlowControl {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaFlowControl {
    pub fn new(consumer: Arc<StreamConsumer>, topic: impl Into<String>) -> Self {
        Self { consumer, topic: topic.into() }
    }

    fn partition_list(&self, partition: i32) -> TopicPartitionList {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition(&self.topic, partition);
        tpl
    }
}

impl FlowControl for KafkaFlowControl {
    fn pause(&self, partition: i32) {
        if let Err(err) = self.consumer.pause(&self.partition_list(partition)) {
            warn!(?err, partition, "failed to pause partition");
        }
    }

    fn resume(&self, partition: i32) {
        if let Err(err) = self.consumer.resume(&self.partition_list(partition)) {
            warn!(?err, partition, "failed to resume partition");
        }
    }
}

/// Feeds the worker pool until the stream ends or `shutdown` resolves, then drains the pool.
pub async fn run(consumer: Arc<StreamConsumer>, mut pool: WorkerPool, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    {
        let mut stream = consumer.stream();
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, draining partition workers");
                    break;
                }
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        let inbound = inbound_from(&message);
                        drop(message);
                        let (partition, offset) = (inbound.metadata.partition, inbound.metadata.offset);
                        if pool.dispatch(inbound).is_err() {
                            error!(partition, offset, "partition worker gone, message left uncommitted");
                        }
                    }
                    Some(Err(err)) => warn!(?err, "kafka consumer error"),
                    None => break,
                }
            }
        }
    }
    pool.shutdown().await;
}
