pub mod campaigns;
pub mod daily_stats;
pub mod error;
#[cfg(any(test, feature = "test-helpers"))]
pub mod memory;
pub mod model;
pub mod settlement;
pub mod settlement_log;

pub use daily_stats::{AggregationWindow, DailyStatsStore, PgDailyStatsStore, WindowError};
pub use error::StoreError;
pub use model::{
    Campaign, CampaignStatus, DailyStat, NewParticipationRecord, ParticipationRecord,
    ParticipationStatus,
};
pub use settlement::{PgSettlementStore, SettlementStore, SettlementTx};

/// Embedded schema for the campaign, participation_history and campaign_stats tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
