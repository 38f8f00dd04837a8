use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CampaignStatus {
    Open,
    Closed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Open => "OPEN",
            CampaignStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<CampaignStatus> {
        match s {
            "OPEN" => Some(CampaignStatus::Open),
            "CLOSED" => Some(CampaignStatus::Closed),
            _ => None,
        }
    }
}

/// Outcome of one settlement attempt. `Fail` means the stock was exhausted, which is
/// a normal business result rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipationStatus {
    Success,
    Fail,
}

impl ParticipationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipationStatus::Success => "SUCCESS",
            ParticipationStatus::Fail => "FAIL",
        }
    }

    pub fn parse(s: &str) -> Option<ParticipationStatus> {
        match s {
            "SUCCESS" => Some(ParticipationStatus::Success),
            "FAIL" => Some(ParticipationStatus::Fail),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub total_stock: i64,
    pub current_stock: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn status(&self) -> Option<CampaignStatus> {
        CampaignStatus::parse(&self.status)
    }

    /// Share of the total stock already handed out, in percent.
    pub fn stock_usage_percent(&self) -> f64 {
        if self.total_stock <= 0 {
            return 0.0;
        }
        let used = (self.total_stock - self.current_stock).max(0) as f64;
        used * 100.0 / self.total_stock as f64
    }
}

/// Row of the append-only settlement log (`participation_history`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRecord {
    pub id: i64,
    pub campaign_id: i64,
    pub user_id: i64,
    pub status: String,
    pub broker_partition: Option<i32>,
    pub broker_offset: Option<i64>,
    /// Producer send time in epoch millis, as reported by the broker.
    pub broker_timestamp: Option<i64>,
    pub global_sequence: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ParticipationRecord {
    pub fn status(&self) -> Option<ParticipationStatus> {
        ParticipationStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipationRecord {
    pub campaign_id: i64,
    pub user_id: i64,
    pub status: ParticipationStatus,
    pub broker_partition: Option<i32>,
    pub broker_offset: Option<i64>,
    pub broker_timestamp: Option<i64>,
    pub global_sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub campaign_id: i64,
    pub stats_date: NaiveDate,
    pub success_count: i64,
    pub fail_count: i64,
}

impl DailyStat {
    pub fn total(&self) -> i64 {
        self.success_count + self.fail_count
    }

    pub fn success_rate_percent(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.success_count as f64 * 100.0 / total as f64,
        }
    }
}
