use common_http_errors::ApiError;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use axum::body::to_bytes;
use uuid::Uuid;

#[test]
fn bad_request_variant() {
    let err = ApiError::BadRequest { code: "invalid_window", trace_id: None, message: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_window");
}

#[test]
fn not_found_variant() {
    let err = ApiError::not_found("campaign_not_found");
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "campaign_not_found");
}

#[test]
fn internal_variant() {
    let trace = Some(Uuid::new_v4());
    let err = ApiError::internal("boom", trace);
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
}

#[test]
fn internal_variant_with_domain_code() {
    let err = ApiError::Internal { code: "publish_failed", trace_id: None, message: None };
    assert_eq!(err.code(), "publish_failed");
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "publish_failed");
}

#[tokio::test]
async fn body_shape_is_camel_case() {
    let resp = ApiError::bad_request("invalid_date", "date is in the future").into_response();
    let body = to_bytes(resp.into_body(), 1024 * 8).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "invalid_date");
    assert_eq!(json["message"], "date is in the future");
    assert!(json.get("traceId").is_none());
}
