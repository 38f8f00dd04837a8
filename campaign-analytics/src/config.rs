use anyhow::{anyhow, Context, Result};
use chrono::NaiveTime;
use std::env;

use crate::aggregation::AggregationMode;

/// Upper bound for `AGGREGATION_MAX_PAST_DAYS`, about a century.
pub const MAX_PAST_DAYS_LIMIT: i64 = 36_500;

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub database_url: String,
    pub aggregation_mode: AggregationMode,
    pub daily_at: NaiveTime,
    pub schedule_enabled: bool,
    pub max_past_days: i64,
    pub history_size: usize,
    pub sample_limit: usize,
    pub host: String,
    pub port: u16,
}

impl AnalyticsConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let aggregation_mode = match env::var("AGGREGATION_MODE") {
            Ok(raw) => raw.parse::<AggregationMode>().map_err(|e| anyhow!(e))?,
            Err(_) => AggregationMode::SetBased,
        };
        let daily_at = match env::var("AGGREGATION_DAILY_AT") {
            Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .with_context(|| format!("AGGREGATION_DAILY_AT must be HH:MM, got {raw}"))?,
            Err(_) => NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN),
        };
        let schedule_enabled = env::var("AGGREGATION_SCHEDULE_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let max_past_days = env::var("AGGREGATION_MAX_PAST_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(365);
        let history_size = env::var("AGGREGATION_HISTORY_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(100);
        let sample_limit = env::var("ORDER_ANALYSIS_SAMPLE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(20);
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()).unwrap_or(8086);

        Ok(Self {
            database_url,
            aggregation_mode,
            daily_at,
            schedule_enabled,
            max_past_days: max_past_days.clamp(0, MAX_PAST_DAYS_LIMIT),
            history_size: history_size.clamp(1, 1000),
            sample_limit: sample_limit.min(1000),
            host,
            port,
        })
    }
}
