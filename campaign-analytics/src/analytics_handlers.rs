use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use common_http_errors::{ApiError, ApiResult};
use common_ledger::{
    campaigns, daily_stats, settlement_log, AggregationWindow, Campaign, DailyStat,
    ParticipationRecord, StoreError,
};
use common_observability::encode_text;
use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationError, AggregationReport, RunRecord};
use crate::order_analysis::{analyze_campaign, OrderAnalysis};
use crate::AppState;

fn store_error(err: StoreError) -> ApiError {
    tracing::error!(?err, "store query failed");
    ApiError::internal(err, None)
}

async fn require_campaign(state: &AppState, campaign_id: i64) -> ApiResult<Campaign> {
    campaigns::fetch_campaign(&state.db, campaign_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::not_found("campaign_not_found"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAnalysisResponse {
    pub campaign_id: i64,
    #[serde(flatten)]
    pub analysis: OrderAnalysis,
    pub query_time_ms: u64,
}

pub async fn get_order_analysis(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> ApiResult<Json<OrderAnalysisResponse>> {
    let started = Instant::now();
    require_campaign(&state, campaign_id).await?;
    let analysis = analyze_campaign(&state.db, campaign_id, state.sample_limit)
        .await
        .map_err(store_error)?;
    tracing::info!(
        campaign_id,
        records = analysis.total_records,
        inversions = analysis.inversion_count,
        accuracy = analysis.order_accuracy_percent,
        "order analysis computed"
    );
    Ok(Json(OrderAnalysisResponse {
        campaign_id,
        analysis,
        query_time_ms: started.elapsed().as_millis() as u64,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignStatusResponse {
    pub campaign_id: i64,
    pub name: String,
    pub status: String,
    pub total_stock: i64,
    pub current_stock: i64,
    pub success_count: i64,
    pub fail_count: i64,
    pub total_participations: i64,
    pub stock_usage_percent: f64,
}

pub async fn get_campaign_status(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
) -> ApiResult<Json<CampaignStatusResponse>> {
    let campaign = require_campaign(&state, campaign_id).await?;
    let counts = settlement_log::status_counts(&state.db, campaign_id)
        .await
        .map_err(store_error)?;
    Ok(Json(CampaignStatusResponse {
        campaign_id,
        stock_usage_percent: campaign.stock_usage_percent(),
        name: campaign.name,
        status: campaign.status,
        total_stock: campaign.total_stock,
        current_stock: campaign.current_stock,
        success_count: counts.success_count,
        fail_count: counts.fail_count,
        total_participations: counts.success_count + counts.fail_count,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    pub date: Option<NaiveDate>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub campaign_id: Option<i64>,
}

impl AggregationRequest {
    fn window(&self) -> ApiResult<AggregationWindow> {
        match (self.date, self.start, self.end) {
            (Some(date), None, None) => AggregationWindow::for_date(date)
                .map_err(|e| ApiError::bad_request("invalid_window", e.to_string())),
            (None, Some(start), Some(end)) => AggregationWindow::new(start, end)
                .map_err(|e| ApiError::bad_request("invalid_window", e.to_string())),
            _ => Err(ApiError::bad_request("invalid_window", "provide either date, or start and end")),
        }
    }
}

pub async fn post_aggregation(
    State(state): State<AppState>,
    Json(req): Json<AggregationRequest>,
) -> ApiResult<(StatusCode, Json<AggregationReport>)> {
    let window = req.window()?;
    let today = Utc::now().date_naive();
    match state.job.run_on_demand(req.campaign_id, window, today).await {
        Ok(report) => Ok((StatusCode::OK, Json(report))),
        Err(err) if err.is_invalid_request() => {
            let code = match err {
                AggregationError::FutureWindow(_) => "future_date",
                AggregationError::TooFarInPast { .. } => "date_too_old",
                _ => "invalid_window",
            };
            Err(ApiError::bad_request(code, err.to_string()))
        }
        Err(err) => Err(ApiError::Internal {
            code: "aggregation_failed",
            trace_id: None,
            message: Some(err.to_string()),
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

pub async fn get_aggregation_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Json<Vec<RunRecord>> {
    let limit = q.limit.unwrap_or(20).min(1000);
    Json(state.job.history().recent(limit))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatView {
    #[serde(flatten)]
    pub stat: DailyStat,
    pub total_count: i64,
    pub success_rate_percent: f64,
}

impl From<DailyStat> for DailyStatView {
    fn from(stat: DailyStat) -> Self {
        Self { total_count: stat.total(), success_rate_percent: stat.success_rate_percent(), stat }
    }
}

#[derive(Debug, Deserialize)]
pub struct DailyQuery {
    pub date: NaiveDate,
}

pub async fn get_daily_stats(
    State(state): State<AppState>,
    Query(q): Query<DailyQuery>,
) -> ApiResult<Json<Vec<DailyStatView>>> {
    let rows = daily_stats::stats_for_date(&state.db, q.date).await.map_err(store_error)?;
    Ok(Json(rows.into_iter().map(DailyStatView::from).collect()))
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Defaults to the last 7 days ending today.
pub fn resolve_range(q: &RangeQuery, today: NaiveDate) -> ApiResult<(NaiveDate, NaiveDate)> {
    let end = q.end.unwrap_or(today);
    let start = q.start.unwrap_or(end - Duration::days(6));
    if start > end {
        return Err(ApiError::bad_request("invalid_range", "start must not be after end"));
    }
    Ok((start, end))
}

pub async fn get_campaign_stats(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
    Query(q): Query<RangeQuery>,
) -> ApiResult<Json<Vec<DailyStatView>>> {
    let (start, end) = resolve_range(&q, Utc::now().date_naive())?;
    let rows = daily_stats::stats_for_campaign(&state.db, campaign_id, start, end)
        .await
        .map_err(store_error)?;
    Ok(Json(rows.into_iter().map(DailyStatView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct RawQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: Option<i64>,
}

pub async fn get_raw_records(
    State(state): State<AppState>,
    Query(q): Query<RawQuery>,
) -> ApiResult<Json<Vec<ParticipationRecord>>> {
    if q.start >= q.end {
        return Err(ApiError::bad_request("invalid_range", "start must be before end"));
    }
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let rows = settlement_log::records_between(&state.db, q.start, q.end, limit)
        .await
        .map_err(store_error)?;
    Ok(Json(rows))
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    match encode_text(&state.metrics.registry) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            tracing::error!(?err, "metrics encode failed");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
