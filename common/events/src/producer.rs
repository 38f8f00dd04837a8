use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{ParticipationEvent, ProducerError, ProducerResult, SinkError};

/// Keyed publish to a topic. Implemented by the Kafka sink and by the in-memory test sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SinkError>;
}

/// Admits participation requests by publishing them; settlement happens downstream.
#[derive(Clone)]
pub struct ParticipationProducer {
    sink: Arc<dyn EventSink>,
    topic: String,
}

impl ParticipationProducer {
    pub fn new(sink: Arc<dyn EventSink>, topic: impl Into<String>) -> Self {
        Self { sink, topic: topic.into() }
    }

    pub async fn participate(&self, campaign_id: i64, user_id: i64) -> ProducerResult<ParticipationEvent> {
        let event = ParticipationEvent { campaign_id, user_id };
        let payload = serde_json::to_vec(&event).map_err(|e| ProducerError::Serialization(e.to_string()))?;
        let key = event.partition_key();
        if let Err(err) = self.sink.send(&self.topic, &key, &payload).await {
            tracing::error!(?err, campaign_id, user_id, topic = %self.topic, "participation publish failed");
            return Err(err.into());
        }
        tracing::debug!(campaign_id, user_id, "participation admitted");
        Ok(event)
    }
}

#[cfg(feature = "kafka")]
pub use kafka_sink::{kafka_producer_config, KafkaEventSink};

#[cfg(feature = "kafka")]
mod kafka_sink {
    use super::*;
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use rdkafka::ClientConfig;
    use std::time::Duration;

    /// Idempotent, acks=all producer that leaves transient retries to librdkafka.
    pub fn kafka_producer_config(bootstrap: &str, message_timeout_ms: u64) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", bootstrap)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.send.max.retries", "2147483647")
            .set("max.in.flight.requests.per.connection", "5")
            .set("linger.ms", "20")
            .set("batch.size", "65536")
            .set("compression.type", "none")
            .set("message.timeout.ms", message_timeout_ms.to_string());
        config
    }

    #[derive(Clone)]
    pub struct KafkaEventSink {
        producer: FutureProducer,
        queue_timeout: Duration,
    }

    impl KafkaEventSink {
        pub fn new(producer: FutureProducer) -> Self {
            Self { producer, queue_timeout: Duration::from_secs(60) }
        }

        pub fn connect(bootstrap: &str, message_timeout_ms: u64) -> Result<Self, SinkError> {
            let producer: FutureProducer = kafka_producer_config(bootstrap, message_timeout_ms)
                .create()
                .map_err(|e| SinkError::Publish(e.to_string()))?;
            Ok(Self::new(producer))
        }
    }

    #[async_trait]
    impl EventSink for KafkaEventSink {
        async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SinkError> {
            let record = FutureRecord::to(topic).key(key).payload(payload);
            match self.producer.send(record, self.queue_timeout).await {
                Ok(_) => Ok(()),
                Err((e, _)) => Err(SinkError::Publish(e.to_string())),
            }
        }
    }
}
