//! API handlers

pub mod cluster;
pub mod records;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Liveness probe, always exempt from readiness gating
pub async fn health() -> &'static str {
    "OK"
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
