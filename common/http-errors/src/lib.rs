use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common_observability::HttpErrorMetrics;
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    Internal { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        Self::Internal { code: "internal_error", trace_id, message: Some(e.to_string()) }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { code, trace_id: None, message: Some(message.into()) }
    }

    pub fn not_found(code: &'static str) -> Self {
        Self::NotFound { code, trace_id: None }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Internal { code, .. } => code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body, error_code) = match self {
            ApiError::BadRequest { code, trace_id, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody { code: code.into(), trace_id, message },
                code,
            ),
            ApiError::NotFound { code, trace_id } => (
                StatusCode::NOT_FOUND,
                ErrorBody { code: code.into(), trace_id, message: None },
                code,
            ),
            ApiError::Internal { code, trace_id, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody { code: code.into(), trace_id, message },
                code,
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Distinct `code` label values kept before new codes collapse into `other`.
pub const MAX_ERROR_CODES: usize = 40;
const OVERFLOW_CODE: &str = "other";

#[derive(Clone)]
pub struct ErrorMetricsLayer {
    service: &'static str,
    metrics: HttpErrorMetrics,
    seen_codes: Arc<Mutex<HashSet<String>>>,
}

impl ErrorMetricsLayer {
    pub fn new(service: &'static str, metrics: HttpErrorMetrics) -> Self {
        Self { service, metrics, seen_codes: Arc::new(Mutex::new(HashSet::new())) }
    }

    fn label_for(&self, code: &str) -> String {
        let Ok(mut seen) = self.seen_codes.lock() else {
            return OVERFLOW_CODE.to_string();
        };
        if seen.contains(code) {
            return code.to_string();
        }
        if seen.len() < MAX_ERROR_CODES {
            seen.insert(code.to_string());
            return code.to_string();
        }
        OVERFLOW_CODE.to_string()
    }

    fn observe(&self, resp: &Response) {
        let status = resp.status();
        if status.as_u16() < 400 {
            return;
        }
        let code = resp
            .headers()
            .get("X-Error-Code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");
        let label = self.label_for(code);
        self.metrics
            .http_errors_total
            .with_label_values(&[self.service, &label, status.as_str()])
            .inc();
    }
}

/// Counts error responses by `X-Error-Code`. Mount with `middleware::from_fn_with_state`.
pub async fn track_http_errors(State(layer): State<ErrorMetricsLayer>, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    layer.observe(&resp);
    resp
}
