use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire payload published on admission and decoded by the settlement consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationEvent {
    pub campaign_id: i64,
    pub user_id: i64,
}

impl ParticipationEvent {
    /// Partition key: all requests of one campaign share an ordering domain per partition.
    pub fn partition_key(&self) -> String {
        self.campaign_id.to_string()
    }
}

/// Transport envelope data attached by the consumer after receipt; never part of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerMetadata {
    pub partition: i32,
    pub offset: i64,
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorType {
    Permanent,
    Transient,
}

/// Published to the dead-letter topic. Single messages carry `originalMessage`; a rolled
/// back batch carries `originalMessages` and `batchSize` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_messages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    pub error_reason: String,
    pub error_type: ErrorType,
    pub error_message: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterEnvelope {
    pub fn single(
        original: impl Into<String>,
        reason: impl Into<String>,
        error_type: ErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            original_message: Some(original.into()),
            original_messages: None,
            batch_size: None,
            error_reason: reason.into(),
            error_type,
            error_message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn batch(
        originals: Vec<String>,
        reason: impl Into<String>,
        error_type: ErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            original_message: None,
            batch_size: Some(originals.len()),
            original_messages: Some(originals),
            error_reason: reason.into(),
            error_type,
            error_message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn message_count(&self) -> usize {
        self.batch_size.unwrap_or(usize::from(self.original_message.is_some()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("publish failed: {0}")]
    Publish(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Publish(#[from] SinkError),
}

pub type ProducerResult<T> = Result<T, ProducerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_camel_case_fields() {
        let json = serde_json::to_value(ParticipationEvent { campaign_id: 12, user_id: 99 }).unwrap();
        assert_eq!(json, serde_json::json!({ "campaignId": 12, "userId": 99 }));
        let decoded: ParticipationEvent = serde_json::from_str(r#"{"campaignId":1,"userId":2}"#).unwrap();
        assert_eq!(decoded.partition_key(), "1");
    }

    #[test]
    fn single_envelope_omits_batch_fields() {
        let env = DeadLetterEnvelope::single("{bad", "DESERIALIZATION_FAILED", ErrorType::Permanent, "eof");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["originalMessage"], "{bad");
        assert_eq!(json["errorType"], "PERMANENT");
        assert!(json.get("originalMessages").is_none());
        assert!(json.get("batchSize").is_none());
        assert_eq!(env.message_count(), 1);
    }

    #[test]
    fn batch_envelope_carries_size() {
        let env = DeadLetterEnvelope::batch(
            vec!["a".into(), "b".into(), "c".into()],
            "RETRIES_EXHAUSTED",
            ErrorType::Transient,
            "pool timed out",
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["batchSize"], 3);
        assert_eq!(json["originalMessages"].as_array().unwrap().len(), 3);
        assert!(json.get("originalMessage").is_none());
        assert_eq!(env.message_count(), 3);
    }
}
