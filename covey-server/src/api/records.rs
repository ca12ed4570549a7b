//! Generic record endpoints
//!
//! The seam where the business-logic collaborator meets the store: bodies
//! are JSON objects folded into typed fields at this boundary, writes go
//! through the store (and from there to the replication observer), and
//! deletes are soft. Real domain handlers would sit in front of this.

use crate::AppState;
use crate::api::error_response;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use covey_core::store::{FieldValue, Fields, sanitize_fields};
use serde_json::json;

fn parse_fields(body: &Bytes) -> Option<Fields> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(object)) => Some(sanitize_fields(object)),
        _ => None,
    }
}

fn now_text() -> FieldValue {
    FieldValue::Text(Utc::now().to_rfc3339())
}

/// POST /data/{table} - insert a row, assigning the next id
pub async fn create(
    State(state): State<AppState>,
    Path(table): Path<String>,
    body: Bytes,
) -> Response {
    let Some(mut fields) = parse_fields(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "request body must be a JSON object");
    };
    fields.insert("created_at".to_string(), now_text());

    let record_id = match state.store.next_record_id(&table) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to allocate record id: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
        }
    };

    match state.store.insert(&table, record_id, fields) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "table": table, "id": record_id, "status": "created" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Insert into {} failed: {}", table, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// GET /data/{table}/{id} - fetch a row
pub async fn fetch(
    State(state): State<AppState>,
    Path((table, record_id)): Path<(String, u64)>,
) -> Response {
    match state.store.get(&table, record_id) {
        Ok(Some(row)) => Json(row.fields).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no such record"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// PUT /data/{table}/{id} - merge fields into a row
pub async fn update(
    State(state): State<AppState>,
    Path((table, record_id)): Path<(String, u64)>,
    body: Bytes,
) -> Response {
    let Some(mut fields) = parse_fields(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "request body must be a JSON object");
    };
    fields.insert("updated_at".to_string(), now_text());

    match state.store.get(&table, record_id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "no such record"),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }

    match state.store.update(&table, record_id, fields) {
        Ok(()) => Json(json!({ "status": "updated" })).into_response(),
        Err(e) => {
            tracing::error!("Update of {}/{} failed: {}", table, record_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// DELETE /data/{table}/{id} - soft-delete a row
pub async fn remove(
    State(state): State<AppState>,
    Path((table, record_id)): Path<(String, u64)>,
) -> Response {
    match state.store.soft_delete(&table, record_id) {
        Ok(()) => Json(json!({ "status": "deleted" })).into_response(),
        Err(e) => {
            tracing::error!("Delete of {}/{} failed: {}", table, record_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
