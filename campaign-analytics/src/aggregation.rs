//! Folds the settlement log into per-campaign daily totals.
//!
//! Rows are overwritten with freshly computed counts, so a window can be re-run at any time.
//! `SetBased` writes every campaign in one statement and fails as a whole; `PerCampaign`
//! writes each campaign separately and reports the ones that failed.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Days, NaiveDate, Utc};
use common_ledger::{AggregationWindow, DailyStatsStore, StoreError, WindowError};
use common_observability::AggregationMetrics;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregationMode {
    SetBased,
    PerCampaign,
}

impl FromStr for AggregationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "set" | "set-based" => Ok(AggregationMode::SetBased),
            "per-campaign" | "campaign" => Ok(AggregationMode::PerCampaign),
            other => Err(format!("unknown aggregation mode {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    Scheduled,
    OnDemand,
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error("window starts on {0}, which is in the future")]
    FutureWindow(NaiveDate),
    #[error("window starts on {start}, more than {max_past_days} days ago")]
    TooFarInPast { start: NaiveDate, max_past_days: i64 },
    #[error("aggregation failed: {0}")]
    Store(#[from] StoreError),
}

impl AggregationError {
    pub fn is_invalid_request(&self) -> bool {
        !matches!(self, AggregationError::Store(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub stats_date: NaiveDate,
    pub window: AggregationWindow,
    pub campaign_id: Option<i64>,
    pub mode: AggregationMode,
    pub trigger: Trigger,
    pub rows_updated: u64,
    pub campaigns_attempted: usize,
    pub failed_campaigns: Vec<i64>,
    pub duration_ms: u64,
}

impl AggregationReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_campaigns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub stats_date: NaiveDate,
    pub campaign_id: Option<i64>,
    pub mode: AggregationMode,
    pub trigger: Trigger,
    pub outcome: RunOutcome,
    pub rows_updated: u64,
    pub failed_campaigns: Vec<i64>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Most recent runs, oldest evicted first.
pub struct RunHistory {
    capacity: usize,
    runs: Mutex<VecDeque<RunRecord>>,
}

impl RunHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), runs: Mutex::new(VecDeque::new()) }
    }

    pub fn push(&self, run: RunRecord) {
        let Ok(mut runs) = self.runs.lock() else { return };
        if runs.len() == self.capacity {
            runs.pop_front();
        }
        runs.push_back(run);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<RunRecord> {
        self.runs
            .lock()
            .map(|runs| runs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.runs.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct AggregationJob {
    store: Arc<dyn DailyStatsStore>,
    mode: AggregationMode,
    max_past_days: i64,
    history: RunHistory,
    metrics: Arc<AggregationMetrics>,
}

impl AggregationJob {
    pub fn new(
        store: Arc<dyn DailyStatsStore>,
        mode: AggregationMode,
        max_past_days: i64,
        history_size: usize,
        metrics: Arc<AggregationMetrics>,
    ) -> Self {
        Self { store, mode, max_past_days, history: RunHistory::new(history_size), metrics }
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Rejects windows starting after `today` or more than `max_past_days` before it.
    pub fn validate_on_demand(&self, window: &AggregationWindow, today: NaiveDate) -> Result<(), AggregationError> {
        let start = window.stats_date();
        if start > today {
            return Err(AggregationError::FutureWindow(start));
        }
        let oldest = u64::try_from(self.max_past_days)
            .ok()
            .and_then(|days| today.checked_sub_days(Days::new(days)));
        if oldest.is_some_and(|oldest| start < oldest) {
            return Err(AggregationError::TooFarInPast { start, max_past_days: self.max_past_days });
        }
        Ok(())
    }

    pub async fn run_on_demand(
        &self,
        campaign_id: Option<i64>,
        window: AggregationWindow,
        today: NaiveDate,
    ) -> Result<AggregationReport, AggregationError> {
        self.validate_on_demand(&window, today)?;
        self.aggregate(campaign_id, window, Trigger::OnDemand).await
    }

    pub async fn run_for_date(&self, date: NaiveDate) -> Result<AggregationReport, AggregationError> {
        self.aggregate(None, AggregationWindow::for_date(date)?, Trigger::Scheduled).await
    }

    pub async fn aggregate(
        &self,
        campaign_id: Option<i64>,
        window: AggregationWindow,
        trigger: Trigger,
    ) -> Result<AggregationReport, AggregationError> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let result = match self.mode {
            AggregationMode::SetBased => self.set_based(campaign_id, &window).await,
            AggregationMode::PerCampaign => self.per_campaign(campaign_id, &window).await,
        };
        let duration_ms = timer.elapsed().as_millis() as u64;
        self.metrics.run_duration_seconds.observe(timer.elapsed().as_secs_f64());

        let mut run = RunRecord {
            started_at,
            stats_date: window.stats_date(),
            campaign_id,
            mode: self.mode,
            trigger,
            outcome: RunOutcome::Failed,
            rows_updated: 0,
            failed_campaigns: Vec::new(),
            error: None,
            duration_ms,
        };
        match result {
            Ok((rows_updated, campaigns_attempted, failed_campaigns)) => {
                run.outcome = if failed_campaigns.is_empty() { RunOutcome::Completed } else { RunOutcome::Partial };
                run.rows_updated = rows_updated;
                run.failed_campaigns = failed_campaigns.clone();
                self.record(run);
                if rows_updated == 0 {
                    warn!(stats_date = %window.stats_date(), ?campaign_id, "aggregation updated no rows");
                }
                info!(
                    stats_date = %window.stats_date(),
                    ?campaign_id,
                    rows_updated,
                    failed = failed_campaigns.len(),
                    duration_ms,
                    "aggregation finished"
                );
                Ok(AggregationReport {
                    stats_date: window.stats_date(),
                    window,
                    campaign_id,
                    mode: self.mode,
                    trigger,
                    rows_updated,
                    campaigns_attempted,
                    failed_campaigns,
                    duration_ms,
                })
            }
            Err(err) => {
                error!(?err, stats_date = %window.stats_date(), ?campaign_id, "aggregation failed");
                run.error = Some(err.to_string());
                self.record(run);
                Err(err.into())
            }
        }
    }

    fn record(&self, run: RunRecord) {
        let label = match run.outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Partial => "partial",
            RunOutcome::Failed => "failed",
        };
        self.metrics.runs_total.with_label_values(&[label]).inc();
        self.metrics.rows_updated_total.inc_by(run.rows_updated);
        self.history.push(run);
    }

    async fn set_based(
        &self,
        campaign_id: Option<i64>,
        window: &AggregationWindow,
    ) -> Result<(u64, usize, Vec<i64>), StoreError> {
        let rows = self.store.upsert_window(window, campaign_id).await?;
        Ok((rows, rows as usize, Vec::new()))
    }

    async fn per_campaign(
        &self,
        campaign_id: Option<i64>,
        window: &AggregationWindow,
    ) -> Result<(u64, usize, Vec<i64>), StoreError> {
        let campaigns = match campaign_id {
            Some(id) => vec![id],
            None => self.store.campaigns_in_window(window).await?,
        };
        let mut rows = 0;
        let mut failed = Vec::new();
        for id in &campaigns {
            match self.store.upsert_window(window, Some(*id)).await {
                Ok(n) => rows += n,
                Err(err) => {
                    error!(?err, campaign_id = id, stats_date = %window.stats_date(), "campaign aggregation failed");
                    failed.push(*id);
                }
            }
        }
        Ok((rows, campaigns.len(), failed))
    }
}
