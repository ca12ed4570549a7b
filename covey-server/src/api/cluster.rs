//! Cluster coordination endpoints
//!
//! Status-code contract:
//! - `POST /cluster/replicate`: 400 when the receiver is itself primary or
//!   the body is malformed or the origin check fails, 500 when the local
//!   apply fails, 200 `{"status":"replicated"}` on success.
//! - `POST /cluster/sync`: 400 when the receiver is not primary or the
//!   body is malformed, 500 when the snapshot cannot be produced, 200 with
//!   the full snapshot JSON on success.
//!
//! Bodies are parsed from raw bytes so malformed input yields 400 rather
//! than the extractor's 422.

use crate::AppState;
use crate::api::error_response;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use covey_core::cluster::{MutationRecord, SyncRequest};
use serde_json::json;

/// GET /cluster/status - the local node's view of the cluster
pub async fn status(State(state): State<AppState>) -> Response {
    Json(state.cluster.status()).into_response()
}

/// POST /cluster/replicate - apply a mutation shipped by the primary
pub async fn replicate(State(state): State<AppState>, body: Bytes) -> Response {
    if state.cluster.is_primary() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "primary node does not accept replicated mutations",
        );
    }

    let record: MutationRecord = match serde_json::from_slice(&body) {
        Ok(record) => record,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid replication message: {}", e),
            );
        }
    };

    match state.cluster.apply_mutation(&record) {
        Ok(()) => Json(json!({ "status": "replicated" })).into_response(),
        Err(e) if e.is_protocol_violation() => {
            tracing::warn!("Rejected replicated mutation: {}", e);
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => {
            tracing::error!("Failed to apply replicated mutation: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// POST /cluster/sync - hand a requesting replica the full data file
pub async fn sync(State(state): State<AppState>, body: Bytes) -> Response {
    if !state.cluster.is_primary() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "only the primary can provide sync data",
        );
    }

    let request: SyncRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid sync request: {}", e),
            );
        }
    };

    tracing::info!("Received full-sync request from node {}", request.node_id);

    // Snapshotting reads the whole data file; keep it off the async workers
    let cluster = state.cluster.clone();
    match tokio::task::spawn_blocking(move || cluster.provide_sync_data()).await {
        Ok(Ok(snapshot)) => Json(snapshot).into_response(),
        Ok(Err(e)) if e.is_protocol_violation() => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Ok(Err(e)) => {
            tracing::error!("Failed to produce snapshot: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => {
            tracing::error!("Snapshot task panicked: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "snapshot task failed")
        }
    }
}
