use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use common_events::{dead_letter_topic, PARTICIPATION_TOPIC};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub database_url: String,
    pub kafka_bootstrap: String,
    pub topic: String,
    pub dead_letter_topic: String,
    pub group_id: String,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub max_attempts: u32,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_factor: f32,
    pub max_poll_interval_ms: u64,
    pub session_timeout_ms: u64,
    pub dead_letter_timeout_ms: u64,
    pub resume_sequence_from_store: bool,
    pub run_migrations: bool,
    pub host: String,
    pub port: u16,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let kafka_bootstrap = env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".to_string());
        let topic = env::var("PARTICIPATION_TOPIC").unwrap_or_else(|_| PARTICIPATION_TOPIC.to_string());
        let dead_letter = env::var("DEAD_LETTER_TOPIC").unwrap_or_else(|_| dead_letter_topic(&topic));
        let group_id = env::var("CONSUMER_GROUP").unwrap_or_else(|_| "campaign-participation-group".to_string());
        let batch_size = parse_or::<usize>("SETTLEMENT_BATCH_SIZE", 1);
        let channel_capacity = parse_or::<usize>("SETTLEMENT_CHANNEL_CAPACITY", 1024);
        let max_attempts = parse_or::<u32>("SETTLEMENT_MAX_ATTEMPTS", 3);
        let backoff_initial_ms = parse_or::<u64>("SETTLEMENT_BACKOFF_INITIAL_MS", 100);
        let backoff_max_ms = parse_or::<u64>("SETTLEMENT_BACKOFF_MAX_MS", 5_000);
        let backoff_factor = parse_or::<f32>("SETTLEMENT_BACKOFF_FACTOR", 2.0);
        let max_poll_interval_ms = parse_or::<u64>("KAFKA_MAX_POLL_INTERVAL_MS", 600_000);
        let session_timeout_ms = parse_or::<u64>("KAFKA_SESSION_TIMEOUT_MS", 45_000);
        let dead_letter_timeout_ms = parse_or::<u64>("DEAD_LETTER_TIMEOUT_MS", 30_000);
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_or::<u16>("PORT", 8090);

        Ok(Self {
            database_url,
            kafka_bootstrap,
            topic,
            dead_letter_topic: dead_letter,
            group_id,
            batch_size: batch_size.clamp(1, 500),
            channel_capacity: channel_capacity.max(16),
            max_attempts: max_attempts.max(1),
            backoff_initial: Duration::from_millis(backoff_initial_ms.max(1)),
            backoff_max: Duration::from_millis(backoff_max_ms.max(backoff_initial_ms.max(1))),
            backoff_factor: if backoff_factor >= 1.0 { backoff_factor } else { 2.0 },
            max_poll_interval_ms,
            session_timeout_ms,
            dead_letter_timeout_ms,
            resume_sequence_from_store: flag("SEQUENCE_RESUME_FROM_STORE", true),
            run_migrations: flag("RUN_MIGRATIONS", true),
            host,
            port,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: self.backoff_initial,
            max_delay: self.backoff_max,
            factor: self.backoff_factor,
            jitter: true,
        }
    }
}
