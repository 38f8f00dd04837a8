use anyhow::{Context, Result};
use std::env;

use common_events::PARTICIPATION_TOPIC;

#[derive(Debug, Clone)]
pub struct ParticipationConfig {
    pub kafka_bootstrap: String,
    pub topic: String,
    /// 0 lets the broker client retry a send without a deadline.
    pub message_timeout_ms: u64,
    pub host: String,
    pub port: u16,
}

impl ParticipationConfig {
    pub fn from_env() -> Result<Self> {
        let message_timeout_ms = match env::var("PRODUCER_MESSAGE_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("PRODUCER_MESSAGE_TIMEOUT_MS must be an integer, got {raw}"))?,
            Err(_) => 0,
        };
        Ok(Self {
            kafka_bootstrap: env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".into()),
            topic: env::var("PARTICIPATION_TOPIC").unwrap_or_else(|_| PARTICIPATION_TOPIC.into()),
            message_timeout_ms,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8081),
        })
    }
}
