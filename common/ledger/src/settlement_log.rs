use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::model::ParticipationRecord;

const RECORD_COLUMNS: &str = "id, campaign_id, user_id, status, broker_partition, broker_offset, \
     broker_timestamp, global_sequence, created_at";

/// Every settlement record of a campaign, oldest first.
pub async fn records_for_campaign(
    db: &PgPool,
    campaign_id: i64,
) -> Result<Vec<ParticipationRecord>, StoreError> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM participation_history WHERE campaign_id = $1 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, ParticipationRecord>(&sql)
        .bind(campaign_id)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

/// Raw records created inside `[start, end)`, newest first, capped at `limit`.
pub async fn records_between(
    db: &PgPool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<ParticipationRecord>, StoreError> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM participation_history \
         WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at DESC, id DESC LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ParticipationRecord>(&sql)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

/// Highest sequence ever written, used to resume the in-process counter after a restart.
pub async fn max_global_sequence(db: &PgPool) -> Result<Option<i64>, StoreError> {
    let max = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(global_sequence) FROM participation_history",
    )
    .fetch_one(db)
    .await?;
    Ok(max)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub success_count: i64,
    pub fail_count: i64,
}

pub async fn status_counts(db: &PgPool, campaign_id: i64) -> Result<StatusCounts, StoreError> {
    let counts = sqlx::query_as::<_, StatusCounts>(
        r#"SELECT COUNT(*) FILTER (WHERE status = 'SUCCESS') AS success_count,
                  COUNT(*) FILTER (WHERE status = 'FAIL')    AS fail_count
             FROM participation_history
            WHERE campaign_id = $1"#,
    )
    .bind(campaign_id)
    .fetch_one(db)
    .await?;
    Ok(counts)
}
