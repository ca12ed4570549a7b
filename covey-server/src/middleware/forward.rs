//! Write forwarding
//!
//! Read verbs pass straight through on any node. Write verbs are handled
//! locally only on the primary; a replica relays them to the primary and
//! returns its response verbatim - the client never learns which node it
//! hit. With no primary known the write is refused outright.

use crate::AppState;
use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Largest request body the forwarder will buffer for relay
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Relay write verbs arriving on a replica to the current primary
pub async fn forward_writes(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if super::is_coordination_path(request.uri().path())
        || !super::is_write_method(request.method())
    {
        return next.run(request).await;
    }

    if state.cluster.is_primary() {
        return next.run(request).await;
    }

    let Some(primary) = state.cluster.primary_address() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "no primary available",
                "message": "the cluster has no active primary to process write operations",
            })),
        )
            .into_response();
    };

    match relay_to_primary(&state, &primary, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Failed to forward write to primary: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "failed to forward to primary",
                    "message": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn relay_to_primary(
    state: &AppState,
    primary: &str,
    request: Request,
) -> anyhow::Result<Response> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let target = format!("{}{}", primary, path_and_query);

    tracing::info!(
        "Forwarding {} {} to primary at {}",
        request.method(),
        path_and_query,
        primary
    );

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_FORWARD_BODY).await?;

    let mut headers = parts.headers;
    headers.remove(header::HOST);

    let upstream = state
        .cluster
        .http()
        .request(parts.method, target)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await?;

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    for (name, value) in upstream_headers.iter() {
        // Hop-by-hop and length headers are rebuilt by this server
        if name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
            || name == header::CONTENT_LENGTH
        {
            continue;
        }
        response.headers_mut().insert(name.clone(), value.clone());
    }

    Ok(response)
}
