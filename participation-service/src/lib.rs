pub mod config;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use common_events::{ParticipationEvent, ParticipationProducer, ProducerError};
use common_http_errors::{track_http_errors, ApiError, ApiResult, ErrorMetricsLayer};
use common_observability::{encode_text, AdmissionMetrics, HttpErrorMetrics};
use serde::Deserialize;

pub const SERVICE_NAME: &str = "participation-service";

#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<ParticipationProducer>,
    pub metrics: Arc<AdmissionMetrics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRequest {
    pub user_id: i64,
}

pub async fn participate(
    State(state): State<AppState>,
    Path(campaign_id): Path<i64>,
    Json(req): Json<ParticipationRequest>,
) -> ApiResult<(StatusCode, Json<ParticipationEvent>)> {
    let outcome = state.metrics.participations_total.clone();
    if campaign_id <= 0 {
        outcome.with_label_values(&["rejected"]).inc();
        return Err(ApiError::bad_request("invalid_campaign_id", "campaignId must be positive"));
    }
    if req.user_id <= 0 {
        outcome.with_label_values(&["rejected"]).inc();
        return Err(ApiError::bad_request("invalid_user_id", "userId must be positive"));
    }
    match state.producer.participate(campaign_id, req.user_id).await {
        Ok(event) => {
            outcome.with_label_values(&["admitted"]).inc();
            Ok((StatusCode::ACCEPTED, Json(event)))
        }
        Err(err) => {
            outcome.with_label_values(&["failed"]).inc();
            let code = match err {
                ProducerError::Serialization(_) => "serialization_failed",
                ProducerError::Publish(_) => "publish_failed",
            };
            Err(ApiError::Internal { code, trace_id: None, message: Some(err.to_string()) })
        }
    }
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

pub fn app(state: AppState) -> prometheus::Result<Router> {
    let errors = HttpErrorMetrics::register(&state.metrics.registry)?;
    let layer = ErrorMetricsLayer::new(SERVICE_NAME, errors);
    Ok(Router::new()
        .route("/campaigns/:id/participations", post(participate))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(layer, track_http_errors))
        .with_state(state))
}
