use common_events::ErrorType;
use common_ledger::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("payload could not be decoded: {0}")]
    Decode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SettlementError::Store(err) if err.is_transient())
    }
}

/// `errorReason` codes carried by dead-letter envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterReason {
    DeserializationFailed,
    CampaignNotFound,
    RetriesExhausted,
    StoreRejected,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::DeserializationFailed => "DESERIALIZATION_FAILED",
            DeadLetterReason::CampaignNotFound => "CAMPAIGN_NOT_FOUND",
            DeadLetterReason::RetriesExhausted => "RETRIES_EXHAUSTED",
            DeadLetterReason::StoreRejected => "STORE_REJECTED",
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            DeadLetterReason::RetriesExhausted => ErrorType::Transient,
            _ => ErrorType::Permanent,
        }
    }
}

#[derive(Debug, Error)]
#[error("offset commit failed for partition {partition}: {message}")]
pub struct AckError {
    pub partition: i32,
    pub message: String,
}
