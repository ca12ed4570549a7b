//! Covey Server - HTTP surface for a cluster-coordinated app service
//!
//! Exposes the coordination endpoints plus a generic record surface that
//! stands in for the business-logic collaborator:
//! - GET /cluster/status - local view of the cluster
//! - POST /cluster/replicate - receive a replicated mutation (replicas)
//! - POST /cluster/sync - serve a full snapshot (primary)
//! - GET /health - liveness probe
//! - POST /data/{table}, GET/PUT/DELETE /data/{table}/{id} - record CRUD
//!
//! Two middlewares wrap every non-coordination route: the readiness gate
//! (503 until the node has synced or become primary) and the write
//! forwarder (writes on a replica are relayed to the primary verbatim).

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use covey_core::{Cluster, TableStore};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod config;
pub mod middleware;

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    /// Cluster coordination layer
    pub cluster: Arc<Cluster>,
    /// Local table store
    pub store: Arc<TableStore>,
}

/// Assemble the full application router, middleware included
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/cluster/status", get(api::cluster::status))
        .route("/cluster/replicate", post(api::cluster::replicate))
        .route("/cluster/sync", post(api::cluster::sync))
        .route("/data/{table}", post(api::records::create))
        .route("/data/{table}/{id}", get(api::records::fetch))
        .route("/data/{table}/{id}", put(api::records::update))
        .route("/data/{table}/{id}", delete(api::records::remove))
        // Layer order: tracing and CORS outermost, then the readiness
        // gate, then the forwarder, then the handlers
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::forward::forward_writes,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::readiness::readiness_gate,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
