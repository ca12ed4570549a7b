//! Leader election
//!
//! Best-effort, heuristic scheme: the healthy node with the lowest id is
//! the primary. Every node recomputes this locally on a fixed cadence,
//! with no quorum and no fencing. Under a partition each side can elect
//! its own primary (split-brain), which is a documented limitation of the
//! scheme, not something this module tries to solve.

use super::state::{Cluster, NodeRole};
use tokio::time::MissedTickBehavior;

impl Cluster {
    /// Recompute the primary from the current healthy-node view
    ///
    /// Deterministic given the same input set: the lowest healthy id wins,
    /// uniformly across all nodes. With no healthy nodes the previous
    /// assignment is retained. A node about to promote itself on top of an
    /// empty store first pulls a snapshot from the runner-up, so a freshly
    /// wiped node never silently becomes an empty-database primary.
    pub async fn elect_leader(&self) {
        let healthy = self.inner.read().healthy_nodes();

        if healthy.is_empty() {
            tracing::debug!("No healthy nodes; keeping previous primary assignment");
            return;
        }

        let candidate = healthy[0].clone();
        let self_id = self.self_id();

        if self_id == Some(candidate.id) && healthy.len() > 1 {
            match self.store.is_empty() {
                Ok(true) => {
                    let donor = &healthy[1];
                    tracing::warn!(
                        "This node would become primary with an empty store; syncing from node {} first",
                        donor.id
                    );
                    if let Err(e) = self.request_snapshot_from(&donor.address).await {
                        tracing::warn!(
                            "Pre-promotion sync from node {} failed: {}. Taking over with an empty store, which may lose data",
                            donor.id,
                            e
                        );
                    } else {
                        tracing::info!("Pre-promotion sync complete");
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Could not check store emptiness: {}", e),
            }
        }

        let demoted = {
            let mut inner = self.inner.write();
            let changed = inner.primary_id != Some(candidate.id);
            let old_primary = inner.primary_id;

            inner.primary_id = Some(candidate.id);
            inner.primary_address = Some(candidate.address.clone());

            if !changed {
                false
            } else {
                tracing::info!("Primary changed: old={:?} new={}", old_primary, candidate.id);

                for node in inner.nodes.values_mut() {
                    node.role = if node.id == candidate.id {
                        NodeRole::Primary
                    } else {
                        NodeRole::Replica
                    };
                }

                if inner.self_id == Some(candidate.id) {
                    inner.role = NodeRole::Primary;
                    inner.ready = true;
                    tracing::info!("This node (id {}) is now the primary", candidate.id);
                    false
                } else {
                    inner.role = NodeRole::Replica;
                    inner.ready = false;
                    tracing::info!(
                        "This node (id {:?}) is now a replica of node {}; resync scheduled",
                        inner.self_id,
                        candidate.id
                    );
                    true
                }
            }
        };

        if demoted {
            // Let the new primary stabilize before pulling a snapshot
            let Some(cluster) = self.arc() else { return };
            tokio::spawn(async move {
                tokio::time::sleep(cluster.config.stabilization_delay).await;
                if let Err(e) = cluster.sync_with_backoff().await {
                    tracing::error!(
                        "Resync after primary change failed: {}. Node stays unready until the next election cycle",
                        e
                    );
                }
            });
        }
    }

    /// Spawn the periodic discovery + election loop
    ///
    /// Runs until the process exits. Discovery failures are logged and
    /// skip the election pass; the next tick retries from scratch.
    pub fn spawn_election_loop(&self) -> tokio::task::JoinHandle<()> {
        let cluster = self.arc();
        tracing::info!(
            "Starting election loop (every {:?})",
            self.config.election_interval
        );

        tokio::spawn(async move {
            let Some(cluster) = cluster else { return };
            let mut ticker = tokio::time::interval(cluster.config.election_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The startup path already ran a discovery + election pass
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if let Err(e) = cluster.discover_peers().await {
                    tracing::warn!("Peer discovery failed: {}. Will retry next cycle", e);
                    continue;
                }
                cluster.elect_leader().await;
                cluster.log_state();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::registry::Node;
    use crate::cluster::testutil;
    use crate::store::{FieldValue, Fields};
    use axum::{Json, Router, routing::post};
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use std::time::{Duration, Instant};

    fn node(id: u32) -> Node {
        Node::new(id, format!("http://10.0.0.{}:3000", id))
    }

    #[tokio::test]
    async fn test_lowest_id_wins_deterministically() {
        let (_dir, cluster) = testutil::cluster();
        cluster.set_self_id(12);
        for id in [5, 12, 7] {
            cluster.insert_node(node(id));
        }

        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(5));
        assert_eq!(cluster.role(), NodeRole::Replica);
        assert!(!cluster.is_ready());

        // Same input set, same outcome - and no spurious change handling
        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(5));
    }

    #[tokio::test]
    async fn test_self_election_promotes_and_readies() {
        let (_dir, cluster) = testutil::cluster();
        cluster.set_self_id(5);
        cluster.insert_node(node(5));

        cluster.elect_leader().await;
        assert!(cluster.is_primary());
        assert!(cluster.is_ready());
        assert_eq!(cluster.primary_id(), Some(5));
    }

    #[tokio::test]
    async fn test_no_healthy_nodes_is_a_noop() {
        let (_dir, cluster) = testutil::cluster();
        cluster.set_self_id(12);
        for id in [5, 12] {
            cluster.insert_node(node(id));
        }
        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(5));

        for node in cluster.inner.write().nodes.values_mut() {
            node.healthy = false;
        }

        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(5));
    }

    #[tokio::test]
    async fn test_stale_primary_eviction_triggers_reelection() {
        let (_dir, cluster) = testutil::cluster();
        cluster.set_self_id(12);
        for id in [5, 7, 12] {
            cluster.insert_node(node(id));
        }

        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(5));

        // Node 5 goes quiet past the stale threshold and gets evicted
        {
            let mut inner = cluster.inner.write();
            inner.nodes.get_mut(&5).unwrap().last_seen =
                Instant::now() - Duration::from_secs(35);
            inner.cleanup_stale(Duration::from_secs(30));
        }
        assert_eq!(cluster.node_count(), 2);

        cluster.elect_leader().await;
        assert_eq!(cluster.primary_id(), Some(7));
        assert_eq!(cluster.role(), NodeRole::Replica);
        assert!(!cluster.is_ready());
    }

    #[tokio::test]
    async fn test_empty_store_pulls_snapshot_before_promotion() {
        // Donor holding the data this node is missing
        let (_donor_dir, donor) = testutil::cluster();
        donor
            .store()
            .insert(
                "posts",
                42,
                Fields::from([("title".to_string(), FieldValue::Text("kept".to_string()))]),
            )
            .unwrap();
        let payload = STANDARD.encode(donor.store().snapshot_bytes().unwrap());

        let app = Router::new().route(
            "/cluster/sync",
            post(move || {
                let payload = payload.clone();
                async move {
                    Json(serde_json::json!({
                        "database": payload,
                        "origin_id": 7u32,
                        "timestamp": chrono::Utc::now(),
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (_dir, cluster) = testutil::cluster();
        cluster.set_self_id(5);
        cluster.insert_node(node(5));
        cluster.insert_node(Node::new(7, format!("http://{}", addr)));

        cluster.elect_leader().await;

        assert!(cluster.is_primary());
        let row = cluster.store().get("posts", 42).unwrap().unwrap();
        assert_eq!(
            row.fields["title"],
            FieldValue::Text("kept".to_string())
        );
    }
}
