pub mod aggregation;
pub mod analytics_handlers;
pub mod config;
pub mod inversions;
pub mod order_analysis;
pub mod scheduler;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use common_http_errors::{track_http_errors, ErrorMetricsLayer};
use common_observability::{AggregationMetrics, HttpErrorMetrics};
use sqlx::PgPool;

use crate::aggregation::AggregationJob;
use crate::analytics_handlers::{
    get_aggregation_history, get_campaign_stats, get_campaign_status, get_daily_stats,
    get_order_analysis, get_raw_records, health, metrics, post_aggregation,
};

pub const SERVICE_NAME: &str = "campaign-analytics";

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub job: Arc<AggregationJob>,
    pub metrics: Arc<AggregationMetrics>,
    pub sample_limit: usize,
}

pub fn app(state: AppState) -> prometheus::Result<Router> {
    let errors = HttpErrorMetrics::register(&state.metrics.registry)?;
    let layer = ErrorMetricsLayer::new(SERVICE_NAME, errors);
    Ok(Router::new()
        .route("/campaigns/:id/order-analysis", get(get_order_analysis))
        .route("/campaigns/:id/status", get(get_campaign_status))
        .route("/aggregations", post(post_aggregation))
        .route("/aggregations/history", get(get_aggregation_history))
        .route("/stats/daily", get(get_daily_stats))
        .route("/stats/campaigns/:id", get(get_campaign_stats))
        .route("/stats/raw", get(get_raw_records))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(layer, track_http_errors))
        .with_state(state))
}
