//! Write replication
//!
//! The primary captures every committed local write through the store's
//! observer seam and fans it out to all healthy followers, one HTTP POST
//! per follower, fire-and-forget. Delivery is at-most-once: a failed
//! delivery is logged and never retried; the next full snapshot sync is
//! the only repair mechanism for a missed mutation.

use super::registry::Node;
use super::state::Cluster;
use crate::error::{Error, Result};
use crate::store::{Fields, MutationKind, MutationObserver};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A committed write, as shipped from the primary to its followers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Kind of write
    pub operation: MutationKind,
    /// Table the write touched
    pub table: String,
    /// Sanitized copy of the written columns
    #[serde(default)]
    pub fields: Fields,
    /// Id of the primary that originated the write
    pub origin_id: u32,
    /// Id of the affected row
    pub record_id: u64,
    /// When the primary captured the write
    pub timestamp: DateTime<Utc>,
}

impl Cluster {
    /// Fan a mutation out to every healthy follower
    ///
    /// No-ops (with a warning) when called on a non-primary. Each delivery
    /// runs in its own task; one unreachable follower never delays or
    /// fails the others, and the originating write has already committed.
    pub fn replicate_to_followers(&self, record: MutationRecord) {
        if !self.is_primary() {
            tracing::warn!("Replication attempted on a non-primary node");
            return;
        }

        let followers: Vec<Node> = {
            let inner = self.inner.read();
            inner
                .nodes
                .values()
                .filter(|n| n.healthy && Some(n.id) != inner.self_id)
                .cloned()
                .collect()
        };

        if followers.is_empty() {
            tracing::debug!("No followers to replicate to");
            return;
        }

        tracing::debug!(
            "Replicating {} on {} (record {}) to {} followers",
            record.operation,
            record.table,
            record.record_id,
            followers.len()
        );

        for follower in followers {
            let Some(cluster) = self.arc() else { return };
            let record = record.clone();
            tokio::spawn(async move {
                match cluster.send_replication(&follower.address, &record).await {
                    Ok(()) => tracing::debug!(
                        "Replicated {} {}/{} to node {}",
                        record.operation,
                        record.table,
                        record.record_id,
                        follower.id
                    ),
                    Err(e) => {
                        tracing::warn!("Failed to replicate to node {}: {}", follower.id, e)
                    }
                }
            });
        }
    }

    async fn send_replication(&self, address: &str, record: &MutationRecord) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/cluster/replicate", address))
            .json(record)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::replication(format!(
                "replication rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Apply a replicated mutation on a follower
    ///
    /// Rejects (as a protocol violation) when this node is itself primary
    /// or when the record's origin does not match the recorded primary -
    /// a stale or foreign primary must not overwrite local rows.
    pub fn apply_mutation(&self, record: &MutationRecord) -> Result<()> {
        if self.is_primary() {
            return Err(Error::protocol(
                "primary node cannot accept replicated mutations",
            ));
        }

        let primary_id = self.primary_id();
        if primary_id != Some(record.origin_id) {
            return Err(Error::protocol(format!(
                "mutation from node {} but the recorded primary is {:?}",
                record.origin_id, primary_id
            )));
        }

        tracing::debug!(
            "Applying {} on {} (record {})",
            record.operation,
            record.table,
            record.record_id
        );

        match record.operation {
            MutationKind::Insert => {
                self.store
                    .insert(&record.table, record.record_id, record.fields.clone())
            }
            MutationKind::Update => {
                self.store
                    .update(&record.table, record.record_id, record.fields.clone())
            }
            MutationKind::Delete => self.store.soft_delete(&record.table, record.record_id),
        }
    }
}

/// Store observer that turns committed local writes into replication
///
/// Registered once at startup. Only acts while the local node is primary;
/// replica-side applies pass through it as no-ops, so replication never
/// cascades.
pub struct Replicator {
    cluster: Arc<Cluster>,
}

impl Replicator {
    /// Bridge the given cluster onto the store's observer seam
    pub fn new(cluster: Arc<Cluster>) -> Self {
        Self { cluster }
    }
}

impl MutationObserver for Replicator {
    fn on_commit(&self, kind: MutationKind, table: &str, record_id: u64, fields: &Fields) {
        if !self.cluster.is_primary() {
            return;
        }

        let record = MutationRecord {
            operation: kind,
            table: table.to_string(),
            fields: fields.clone(),
            origin_id: self.cluster.self_id().unwrap_or(0),
            record_id,
            timestamp: Utc::now(),
        };

        self.cluster.replicate_to_followers(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testutil;
    use crate::store::FieldValue;
    use axum::{Json, Router, routing::post};
    use std::time::Duration;

    fn record(operation: MutationKind, origin_id: u32, record_id: u64) -> MutationRecord {
        MutationRecord {
            operation,
            table: "posts".to_string(),
            fields: Fields::from([(
                "title".to_string(),
                FieldValue::Text("hello".to_string()),
            )]),
            origin_id,
            record_id,
            timestamp: Utc::now(),
        }
    }

    async fn replica_of_node_5() -> (tempfile::TempDir, std::sync::Arc<Cluster>) {
        let (dir, cluster) = testutil::cluster();
        cluster.set_self_id(7);
        cluster.insert_node(Node::new(5, "http://10.0.0.5:3000"));
        cluster.insert_node(Node::new(7, "http://10.0.0.7:3000"));
        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(5));
        (dir, cluster)
    }

    #[tokio::test]
    async fn test_apply_rejected_on_primary() {
        let (_dir, cluster) = testutil::cluster();
        cluster.set_self_id(1);
        cluster.insert_node(Node::new(1, "http://10.0.0.1:3000"));
        cluster.elect_leader().await;
        assert!(cluster.is_primary());

        let err = cluster
            .apply_mutation(&record(MutationKind::Insert, 1, 1))
            .unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_apply_rejects_foreign_origin() {
        let (_dir, cluster) = replica_of_node_5().await;

        let err = cluster
            .apply_mutation(&record(MutationKind::Insert, 9, 1))
            .unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(cluster.store().get("posts", 1).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_full_lifecycle() {
        let (_dir, cluster) = replica_of_node_5().await;

        cluster
            .apply_mutation(&record(MutationKind::Insert, 5, 42))
            .unwrap();
        let row = cluster.store().get("posts", 42).unwrap().unwrap();
        assert_eq!(row.fields["title"], FieldValue::Text("hello".to_string()));

        let mut update = record(MutationKind::Update, 5, 42);
        update.fields =
            Fields::from([("title".to_string(), FieldValue::Text("edited".to_string()))]);
        cluster.apply_mutation(&update).unwrap();
        let row = cluster.store().get("posts", 42).unwrap().unwrap();
        assert_eq!(row.fields["title"], FieldValue::Text("edited".to_string()));

        cluster
            .apply_mutation(&record(MutationKind::Delete, 5, 42))
            .unwrap();
        let row = cluster.store().get("posts", 42).unwrap().unwrap();
        assert!(row.fields.contains_key("deleted_at"));
    }

    #[tokio::test]
    async fn test_apply_failure_surfaces_as_store_error() {
        let (_dir, cluster) = replica_of_node_5().await;

        // Update on a row that was never replicated here
        let err = cluster
            .apply_mutation(&record(MutationKind::Update, 5, 404))
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_fanout_survives_unreachable_follower() {
        let (_dir, cluster) = testutil::cluster();

        // Reachable follower that records what it receives
        let (tx, mut rx) = tokio::sync::mpsc::channel::<MutationRecord>(4);
        let app = Router::new().route(
            "/cluster/replicate",
            post(move |Json(received): Json<MutationRecord>| {
                let tx = tx.clone();
                async move {
                    tx.send(received).await.unwrap();
                    Json(serde_json::json!({"status": "replicated"}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        cluster.set_self_id(1);
        cluster.insert_node(Node::new(1, "http://127.0.0.1:3000"));
        cluster.insert_node(Node::new(2, format!("http://{}", addr)));
        // Port 1 refuses connections; this follower is unreachable
        cluster.insert_node(Node::new(3, "http://127.0.0.1:1"));

        // Seed a row so promotion skips the empty-store snapshot pull
        cluster.store().insert("boot", 1, Fields::new()).unwrap();
        cluster.elect_leader().await;
        assert!(cluster.is_primary());

        cluster
            .store()
            .add_observer(Arc::new(Replicator::new(Arc::clone(&cluster))));

        cluster
            .store()
            .insert(
                "posts",
                42,
                Fields::from([("title".to_string(), FieldValue::Text("hi".to_string()))]),
            )
            .unwrap();

        // The local write committed regardless of follower state
        assert!(cluster.store().get("posts", 42).unwrap().is_some());

        // The reachable follower got the record; the dead one only logs
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("replication never arrived")
            .unwrap();
        assert_eq!(received.operation, MutationKind::Insert);
        assert_eq!(received.table, "posts");
        assert_eq!(received.record_id, 42);
        assert_eq!(received.origin_id, 1);
    }
}
