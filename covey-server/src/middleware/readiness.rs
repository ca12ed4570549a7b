//! Readiness gate
//!
//! A node that has not completed its first snapshot sync (and is not the
//! primary) serves nothing but coordination traffic.

use crate::AppState;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Reject non-coordination traffic until the node is ready
pub async fn readiness_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if super::is_coordination_path(request.uri().path()) {
        return next.run(request).await;
    }

    if !state.cluster.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "node not ready",
                "message": "this node is still synchronizing data from the primary",
            })),
        )
            .into_response();
    }

    next.run(request).await
}
