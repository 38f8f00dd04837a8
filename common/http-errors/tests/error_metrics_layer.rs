use axum::{http::StatusCode, middleware, routing::get, Router};
use common_http_errors::{track_http_errors, ApiError, ErrorMetricsLayer, MAX_ERROR_CODES};
use common_observability::{encode_text, HttpErrorMetrics};
use prometheus::Registry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

fn request(uri: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder().uri(uri).body(axum::body::Body::empty()).unwrap()
}

#[tokio::test]
async fn counts_errors_and_ignores_success() {
    let registry = Registry::new();
    let metrics = HttpErrorMetrics::register(&registry).unwrap();
    let app = Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/missing", get(|| async { Err::<&'static str, _>(ApiError::not_found("campaign_not_found")) }))
        .layer(middleware::from_fn_with_state(ErrorMetricsLayer::new("test-svc", metrics.clone()), track_http_errors));

    assert_eq!(app.clone().oneshot(request("/ok")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.clone().oneshot(request("/missing")).await.unwrap().status(), StatusCode::NOT_FOUND);

    let count = metrics.http_errors_total.with_label_values(&["test-svc", "campaign_not_found", "404"]).get();
    assert_eq!(count, 1);
    assert!(encode_text(&registry).unwrap().contains("campaign_not_found"));
}

#[tokio::test]
async fn error_code_cardinality_is_capped() {
    let registry = Registry::new();
    let metrics = HttpErrorMetrics::register(&registry).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/err",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    let code: &'static str = Box::leak(format!("dyn_code_{n}").into_boxed_str());
                    Err::<&'static str, _>(ApiError::BadRequest { code, trace_id: None, message: None })
                }
            }),
        )
        .layer(middleware::from_fn_with_state(ErrorMetricsLayer::new("test-svc", metrics.clone()), track_http_errors));

    let total = MAX_ERROR_CODES + 10;
    for _ in 0..total {
        let resp = app.clone().oneshot(request("/err")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
    let overflow = metrics.http_errors_total.with_label_values(&["test-svc", "other", "400"]).get();
    assert_eq!(overflow, 10);
}
