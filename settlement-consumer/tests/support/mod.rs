#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common_events::{BrokerMetadata, MemoryEventSink};
use common_ledger::memory::MemoryLedger;
use common_observability::SettlementMetrics;
use settlement_consumer::{
    AckError, Acknowledger, DeadLetterPublisher, GlobalSequence, InboundMessage, RetryPolicy,
    SettlementProcessor, Sleeper,
};

pub const DLQ_TOPIC: &str = "campaign-participation-topic.DLQ";

#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

#[derive(Default)]
pub struct RecordingAck {
    pub acks: Mutex<Vec<(i32, i64)>>,
}

impl RecordingAck {
    pub fn acks(&self) -> Vec<(i32, i64)> {
        self.acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Acknowledger for RecordingAck {
    async fn ack(&self, partition: i32, offset: i64) -> Result<(), AckError> {
        self.acks.lock().unwrap().push((partition, offset));
        Ok(())
    }
}

pub struct Harness {
    pub ledger: MemoryLedger,
    pub sink: Arc<MemoryEventSink>,
    pub sleeper: Arc<RecordingSleeper>,
    pub sequence: Arc<GlobalSequence>,
    pub processor: Arc<SettlementProcessor>,
}

impl Harness {
    pub fn new(max_attempts: u32) -> Self {
        let ledger = MemoryLedger::new();
        let sink = Arc::new(MemoryEventSink::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let sequence = Arc::new(GlobalSequence::new());
        let metrics = Arc::new(SettlementMetrics::new().unwrap());
        let dead_letters = DeadLetterPublisher::new(sink.clone(), DLQ_TOPIC, metrics.clone());
        let retry = RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            factor: 2.0,
            jitter: false,
        };
        let processor = Arc::new(SettlementProcessor::new(
            Arc::new(ledger.clone()),
            sequence.clone(),
            dead_letters,
            retry,
            sleeper.clone(),
            metrics,
        ));
        Self { ledger, sink, sleeper, sequence, processor }
    }

    pub fn dead_letters(&self) -> Vec<serde_json::Value> {
        self.sink.sent_to(DLQ_TOPIC).into_iter().map(|m| m.json()).collect()
    }
}

pub fn participation(partition: i32, offset: i64, timestamp_ms: i64, campaign_id: i64, user_id: i64) -> InboundMessage {
    let payload = serde_json::json!({ "campaignId": campaign_id, "userId": user_id }).to_string();
    InboundMessage::new(payload, BrokerMetadata { partition, offset, timestamp_ms: Some(timestamp_ms) })
        .with_key(campaign_id.to_string())
}

pub fn garbage(partition: i32, offset: i64) -> InboundMessage {
    InboundMessage::new(&b"{not-json"[..], BrokerMetadata { partition, offset, timestamp_ms: Some(offset) })
}
