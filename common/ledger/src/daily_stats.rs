//! Daily roll-up of the settlement log into `campaign_stats`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::error::StoreError;
use crate::model::DailyStat;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {start} must be before end {end}")]
    Inverted { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("no full day follows {0}")]
    OutOfRange(NaiveDate),
}

/// Half-open time range `[start, end)` folded into the row for `start`'s calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl AggregationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn for_date(date: NaiveDate) -> Result<Self, WindowError> {
        let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let end = start.checked_add_signed(Duration::days(1)).ok_or(WindowError::OutOfRange(date))?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn stats_date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

#[async_trait]
pub trait DailyStatsStore: Send + Sync {
    /// Campaigns with at least one settlement record inside the window.
    async fn campaigns_in_window(&self, window: &AggregationWindow) -> Result<Vec<i64>, StoreError>;

    /// Recomputes and overwrites the stats rows for the window; `None` covers every campaign.
    /// Returns the number of rows written.
    async fn upsert_window(
        &self,
        window: &AggregationWindow,
        campaign_id: Option<i64>,
    ) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct PgDailyStatsStore {
    db: PgPool,
}

impl PgDailyStatsStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DailyStatsStore for PgDailyStatsStore {
    async fn campaigns_in_window(&self, window: &AggregationWindow) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"SELECT DISTINCT campaign_id
                 FROM participation_history
                WHERE created_at >= $1 AND created_at < $2
                ORDER BY campaign_id"#,
        )
        .bind(window.start())
        .bind(window.end())
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    async fn upsert_window(
        &self,
        window: &AggregationWindow,
        campaign_id: Option<i64>,
    ) -> Result<u64, StoreError> {
        // Overwrite, never add: re-running a window must leave the same totals.
        let result = sqlx::query(
            r#"INSERT INTO campaign_stats (campaign_id, stats_date, success_count, fail_count)
               SELECT p.campaign_id,
                      $3::DATE,
                      COUNT(*) FILTER (WHERE p.status = 'SUCCESS'),
                      COUNT(*) FILTER (WHERE p.status = 'FAIL')
                 FROM participation_history p
                WHERE p.created_at >= $1
                  AND p.created_at < $2
                  AND ($4::BIGINT IS NULL OR p.campaign_id = $4)
                GROUP BY p.campaign_id
               ON CONFLICT (campaign_id, stats_date)
               DO UPDATE SET success_count = EXCLUDED.success_count,
                             fail_count = EXCLUDED.fail_count"#,
        )
        .bind(window.start())
        .bind(window.end())
        .bind(window.stats_date())
        .bind(campaign_id)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }
}

pub async fn stats_for_date(db: &PgPool, date: NaiveDate) -> Result<Vec<DailyStat>, StoreError> {
    let rows = sqlx::query_as::<_, DailyStat>(
        r#"SELECT campaign_id, stats_date, success_count, fail_count
             FROM campaign_stats WHERE stats_date = $1 ORDER BY campaign_id"#,
    )
    .bind(date)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn stats_for_campaign(
    db: &PgPool,
    campaign_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailyStat>, StoreError> {
    let rows = sqlx::query_as::<_, DailyStat>(
        r#"SELECT campaign_id, stats_date, success_count, fail_count
             FROM campaign_stats
            WHERE campaign_id = $1 AND stats_date BETWEEN $2 AND $3
            ORDER BY stats_date"#,
    )
    .bind(campaign_id)
    .bind(from)
    .bind(to)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_inverted_and_empty_ranges() {
        let t = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        assert!(AggregationWindow::new(t, t).is_err());
        assert!(matches!(
            AggregationWindow::new(t + Duration::hours(1), t),
            Err(WindowError::Inverted { .. })
        ));
        assert!(AggregationWindow::new(t, t + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn for_date_covers_one_utc_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let window = AggregationWindow::for_date(date).unwrap();
        assert_eq!(window.start(), Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(window.end(), Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(window.stats_date(), date);
    }

    #[test]
    fn for_date_rejects_the_last_representable_day() {
        assert_eq!(AggregationWindow::for_date(NaiveDate::MAX), Err(WindowError::OutOfRange(NaiveDate::MAX)));
    }

    #[test]
    fn stats_date_follows_window_start() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 22, 0, 0).unwrap();
        let window = AggregationWindow::new(start, start + Duration::hours(4)).unwrap();
        assert_eq!(window.stats_date(), NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
    }
}
