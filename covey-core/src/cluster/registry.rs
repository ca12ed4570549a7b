//! Node registry bookkeeping
//!
//! The registry is the health/heartbeat table inside [`ClusterInner`].
//! A discovery pass marks every known node unseen, re-confirms the ones
//! that answered, and evicts anything unseen past the stale threshold.

use super::state::{ClusterInner, NodeRole};
use std::time::{Duration, Instant};

/// A known peer (or the local node itself)
#[derive(Debug, Clone)]
pub struct Node {
    /// Deterministic id derived from the node's address
    pub id: u32,
    /// Base URL of the node's HTTP endpoint
    pub address: String,
    /// Last role this node was assigned by election
    pub role: NodeRole,
    /// Last time a discovery pass confirmed this node
    pub last_seen: Instant,
    /// Whether the most recent discovery pass saw this node
    pub healthy: bool,
}

impl Node {
    /// Create a freshly-seen, healthy node with the default role
    pub fn new(id: u32, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            role: NodeRole::Replica,
            last_seen: Instant::now(),
            healthy: true,
        }
    }
}

impl ClusterInner {
    /// Mark every known node as unseen ahead of a discovery pass
    pub(crate) fn mark_all_unseen(&mut self) {
        for node in self.nodes.values_mut() {
            node.healthy = false;
        }
    }

    /// Record a node confirmed by the current discovery pass
    pub(crate) fn observe(&mut self, id: u32, address: String) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.last_seen = Instant::now();
            node.healthy = true;
            node.address = address;
            tracing::debug!("Re-confirmed node {}", id);
        } else {
            tracing::info!("Discovered new node {} at {}", id, address);
            self.nodes.insert(id, Node::new(id, address));
        }
    }

    /// Evict nodes unseen for longer than the threshold
    pub(crate) fn cleanup_stale(&mut self, threshold: Duration) {
        self.nodes.retain(|id, node| {
            let stale = node.last_seen.elapsed() > threshold;
            if stale {
                tracing::info!("Removing stale node {}", id);
            }
            !stale
        });
    }

    /// Healthy nodes sorted ascending by id
    pub(crate) fn healthy_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().filter(|n| n.healthy).cloned().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aged(id: u32, age: Duration) -> Node {
        let mut node = Node::new(id, format!("http://10.0.0.{}:3000", id));
        node.last_seen = Instant::now() - age;
        node
    }

    #[test]
    fn test_observe_upserts() {
        let mut inner = ClusterInner::default();
        inner.observe(5, "http://10.0.0.5:3000".to_string());
        assert_eq!(inner.nodes.len(), 1);

        inner.mark_all_unseen();
        assert!(!inner.nodes[&5].healthy);

        inner.observe(5, "http://10.0.1.5:3000".to_string());
        assert!(inner.nodes[&5].healthy);
        assert_eq!(inner.nodes[&5].address, "http://10.0.1.5:3000");
        assert_eq!(inner.nodes.len(), 1);
    }

    #[test]
    fn test_cleanup_stale_removes_only_expired_nodes() {
        let mut inner = ClusterInner::default();
        inner.nodes.insert(5, aged(5, Duration::from_secs(35)));
        inner.nodes.insert(7, aged(7, Duration::from_secs(29)));
        inner.nodes.insert(12, aged(12, Duration::from_secs(1)));

        inner.cleanup_stale(Duration::from_secs(30));

        assert!(!inner.nodes.contains_key(&5));
        assert!(inner.nodes.contains_key(&7));
        assert!(inner.nodes.contains_key(&12));
    }

    #[test]
    fn test_healthy_nodes_sorted_ascending() {
        let mut inner = ClusterInner::default();
        inner.observe(12, "http://10.0.0.12:3000".to_string());
        inner.observe(5, "http://10.0.0.5:3000".to_string());
        inner.observe(7, "http://10.0.0.7:3000".to_string());
        inner.nodes.get_mut(&7).unwrap().healthy = false;

        let healthy = inner.healthy_nodes();
        let ids: Vec<u32> = healthy.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![5, 12]);
    }
}
