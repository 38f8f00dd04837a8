use std::sync::Arc;

use common_events::{DeadLetterEnvelope, EventSink};
use common_observability::SettlementMetrics;

use crate::error::DeadLetterReason;
use crate::message::InboundMessage;

/// Publishes unprocessable messages to the dead-letter topic. A failed publish is logged
/// and counted, never returned: the caller acknowledges the original either way.
#[derive(Clone)]
pub struct DeadLetterPublisher {
    sink: Arc<dyn EventSink>,
    topic: String,
    metrics: Arc<SettlementMetrics>,
}

impl DeadLetterPublisher {
    pub fn new(sink: Arc<dyn EventSink>, topic: impl Into<String>, metrics: Arc<SettlementMetrics>) -> Self {
        Self { sink, topic: topic.into(), metrics }
    }

    pub async fn single(&self, message: &InboundMessage, reason: DeadLetterReason, detail: &str) -> bool {
        let envelope = DeadLetterEnvelope::single(message.payload_text(), reason.as_str(), reason.error_type(), detail);
        tracing::warn!(
            reason = reason.as_str(),
            partition = message.metadata.partition,
            offset = message.metadata.offset,
            detail,
            "dead-lettering message"
        );
        self.publish(&message.routing_key(), reason, &envelope).await
    }

    /// One envelope for a whole rolled-back batch.
    pub async fn batch(&self, messages: &[&InboundMessage], reason: DeadLetterReason, detail: &str) -> bool {
        let Some(first) = messages.first() else { return true };
        if messages.len() == 1 {
            return self.single(first, reason, detail).await;
        }
        let originals = messages.iter().map(|m| m.payload_text()).collect();
        let envelope = DeadLetterEnvelope::batch(originals, reason.as_str(), reason.error_type(), detail);
        tracing::warn!(
            reason = reason.as_str(),
            partition = first.metadata.partition,
            first_offset = first.metadata.offset,
            batch_size = messages.len(),
            detail,
            "dead-lettering batch"
        );
        self.publish(&first.routing_key(), reason, &envelope).await
    }

    async fn publish(&self, key: &str, reason: DeadLetterReason, envelope: &DeadLetterEnvelope) -> bool {
        self.metrics
            .dead_letters_total
            .with_label_values(&[reason.as_str()])
            .inc_by(envelope.message_count() as u64);
        let payload = match serde_json::to_vec(envelope) {
            Ok(p) => p,
            Err(err) => {
                tracing::error!(?err, "dead-letter envelope serialization failed");
                self.metrics.dead_letter_publish_failures.inc();
                return false;
            }
        };
        match self.sink.send(&self.topic, key, &payload).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(?err, topic = %self.topic, reason = reason.as_str(), "dead-letter publish failed");
                self.metrics.dead_letter_publish_failures.inc();
                false
            }
        }
    }
}
