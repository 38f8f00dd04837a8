use common_events::{BrokerMetadata, ParticipationEvent};

use crate::error::SettlementError;

/// A message as handed over by the transport, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub metadata: BrokerMetadata,
}

impl InboundMessage {
    pub fn new(payload: impl Into<Vec<u8>>, metadata: BrokerMetadata) -> Self {
        Self { key: None, payload: payload.into(), metadata }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn decode(&self) -> Result<ParticipationEvent, SettlementError> {
        serde_json::from_slice(&self.payload).map_err(|e| SettlementError::Decode(e.to_string()))
    }

    /// Payload as carried in dead-letter envelopes.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Key for dead-letter publishes: the original key, else the partition id.
    pub fn routing_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| self.metadata.partition.to_string())
    }
}
