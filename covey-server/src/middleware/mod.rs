//! Request-path middleware
//!
//! Two independent layers wrap every non-coordination route:
//! - the readiness gate holds traffic until the node has either become
//!   primary or completed a snapshot sync
//! - the forwarder relays write verbs arriving on a replica to the
//!   current primary
//!
//! Coordination endpoints are exempt from both; a node must be able to
//! answer status probes and receive replication while still syncing.

pub mod forward;
pub mod readiness;

use axum::http::Method;

pub(crate) fn is_coordination_path(path: &str) -> bool {
    matches!(
        path,
        "/cluster/status" | "/cluster/replicate" | "/cluster/sync" | "/health"
    )
}

pub(crate) fn is_write_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
