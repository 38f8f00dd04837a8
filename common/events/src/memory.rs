use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::SinkError;
use crate::producer::EventSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

impl SentMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Records every send; can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryEventSink {
    sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.topic == topic).collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Publish("memory sink set to fail".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage { topic: topic.to_string(), key: key.to_string(), payload: payload.to_vec() });
        }
        Ok(())
    }
}
