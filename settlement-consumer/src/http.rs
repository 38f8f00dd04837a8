use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use common_observability::{encode_text, SettlementMetrics};

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(metrics): State<Arc<SettlementMetrics>>) -> (StatusCode, String) {
    match encode_text(&metrics.registry) {
        Ok(body) => (StatusCode::OK, body),
        Err(err) => {
            tracing::error!(?err, "metrics encode failed");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// Side server for liveness and scraping; the consumer itself has no request API.
pub fn router(metrics: Arc<SettlementMetrics>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/internal/metrics", get(render_metrics))
        .with_state(metrics)
}
