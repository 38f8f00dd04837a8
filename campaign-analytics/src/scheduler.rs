use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::aggregation::AggregationJob;

/// Next daily trigger at `run_at` (UTC) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(run_at));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Aggregates the previous day once a day at `run_at`.
pub fn spawn_daily_aggregation(job: Arc<AggregationJob>, run_at: NaiveTime) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, run_at);
            info!(next_run = %next, "daily aggregation scheduled");
            tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;

            let Some(yesterday) = next.date_naive().pred_opt() else { continue };
            match job.run_for_date(yesterday).await {
                Ok(report) => info!(
                    stats_date = %report.stats_date,
                    rows_updated = report.rows_updated,
                    failed = report.failed_campaigns.len(),
                    "scheduled aggregation complete"
                ),
                // Next attempt is tomorrow's run; on-demand aggregation can fill the gap.
                Err(err) => error!(?err, stats_date = %yesterday, "scheduled aggregation failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn before_trigger_runs_same_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 1, 30, 0).unwrap();
        assert_eq!(next_run_after(now, at(2, 0)), Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap());
    }

    #[test]
    fn at_or_after_trigger_runs_next_day() {
        let exactly = Utc.with_ymd_and_hms(2026, 10, 16, 2, 0, 0).unwrap();
        assert_eq!(next_run_after(exactly, at(2, 0)), Utc.with_ymd_and_hms(2026, 10, 17, 2, 0, 0).unwrap());
        let late = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap();
        assert_eq!(next_run_after(late, at(2, 0)), Utc.with_ymd_and_hms(2027, 1, 1, 2, 0, 0).unwrap());
    }
}
