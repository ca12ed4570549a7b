//! Shared cluster state
//!
//! All coordination state lives in one [`ClusterInner`] behind a single
//! read/write lock, exposed only through accessor methods. Reads (role
//! checks, status queries) take the read lock; discovery, election and
//! readiness transitions take the write lock for the duration of their
//! critical section. Network calls never happen while the lock is held.

use super::registry::Node;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::store::TableStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

/// Role a node plays in the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts writes and originates replication
    Primary,
    /// Mirrors the primary and forwards its own writes there
    Replica,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

/// The lock-protected coordination state
pub(crate) struct ClusterInner {
    pub(crate) self_id: Option<u32>,
    pub(crate) role: NodeRole,
    pub(crate) primary_id: Option<u32>,
    pub(crate) primary_address: Option<String>,
    pub(crate) nodes: HashMap<u32, Node>,
    pub(crate) ready: bool,
}

impl Default for ClusterInner {
    fn default() -> Self {
        Self {
            self_id: None,
            role: NodeRole::Replica,
            primary_id: None,
            primary_address: None,
            nodes: HashMap::new(),
            ready: false,
        }
    }
}

/// Per-node view of one cluster member, as reported by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Node id
    pub id: u32,
    /// Node base URL
    pub address: String,
    /// Role last assigned by election
    pub role: NodeRole,
    /// Whether this node is the current primary
    pub is_primary: bool,
    /// Whether the most recent discovery pass saw this node
    pub healthy: bool,
}

/// Snapshot of the local node's view of the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// The local node's id, once discovered
    pub self_id: Option<u32>,
    /// The local node's role
    pub role: NodeRole,
    /// Current primary's id, if one has been elected
    pub primary_id: Option<u32>,
    /// Current primary's base URL
    pub primary_address: Option<String>,
    /// Whether this node accepts non-coordination traffic
    pub ready: bool,
    /// Number of nodes in the registry
    pub node_count: usize,
    /// Per-node detail, sorted by id
    pub nodes: Vec<NodeStatus>,
}

/// Handle on the cluster coordination layer
///
/// One instance per process, shared behind an `Arc`. Owns the registry,
/// the outbound HTTP client, and the sync-in-flight guard.
pub struct Cluster {
    pub(crate) config: ClusterConfig,
    pub(crate) store: Arc<TableStore>,
    pub(crate) http: reqwest::Client,
    pub(crate) inner: RwLock<ClusterInner>,
    pub(crate) sync_in_flight: AtomicBool,
    self_ref: Weak<Cluster>,
}

impl Cluster {
    /// Create the coordination layer over the given local store
    pub fn new(config: ClusterConfig, store: Arc<TableStore>) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Arc::new_cyclic(|self_ref| Self {
            config,
            store,
            http,
            inner: RwLock::new(ClusterInner::default()),
            sync_in_flight: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    /// Fresh owning handle for background tasks; `None` during teardown
    pub(crate) fn arc(&self) -> Option<Arc<Cluster>> {
        self.self_ref.upgrade()
    }

    /// The cluster configuration
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The local store this node serves from
    pub fn store(&self) -> &Arc<TableStore> {
        &self.store
    }

    /// Shared outbound HTTP client (30 s default timeout)
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The local node's id, once discovery has identified it
    pub fn self_id(&self) -> Option<u32> {
        self.inner.read().self_id
    }

    /// Record the local node's identity (normally set by discovery)
    pub fn set_self_id(&self, id: u32) {
        self.inner.write().self_id = Some(id);
    }

    /// The local node's current role
    pub fn role(&self) -> NodeRole {
        self.inner.read().role
    }

    /// Whether the local node is the current primary
    pub fn is_primary(&self) -> bool {
        self.inner.read().role == NodeRole::Primary
    }

    /// Current primary id, if elected
    pub fn primary_id(&self) -> Option<u32> {
        self.inner.read().primary_id
    }

    /// Current primary base URL, if elected
    pub fn primary_address(&self) -> Option<String> {
        self.inner.read().primary_address.clone()
    }

    /// Whether this node accepts non-coordination traffic
    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Flip the readiness flag
    pub fn set_ready(&self, ready: bool) {
        self.inner.write().ready = ready;
        tracing::info!("Node ready status set to {}", ready);
    }

    /// Register or replace a node in the registry
    pub fn insert_node(&self, node: Node) {
        self.inner.write().nodes.insert(node.id, node);
    }

    /// Number of nodes in the registry
    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Snapshot of the cluster state for the status API
    pub fn status(&self) -> ClusterStatus {
        let inner = self.inner.read();

        let mut nodes: Vec<NodeStatus> = inner
            .nodes
            .values()
            .map(|node| NodeStatus {
                id: node.id,
                address: node.address.clone(),
                role: node.role,
                is_primary: Some(node.id) == inner.primary_id,
                healthy: node.healthy,
            })
            .collect();
        nodes.sort_by_key(|n| n.id);

        ClusterStatus {
            self_id: inner.self_id,
            role: inner.role,
            primary_id: inner.primary_id,
            primary_address: inner.primary_address.clone(),
            ready: inner.ready,
            node_count: inner.nodes.len(),
            nodes,
        }
    }

    /// Dump the cluster view to the log at debug level
    pub fn log_state(&self) {
        let status = self.status();
        tracing::debug!(
            "Cluster state: self={:?} role={} primary={:?} ready={} nodes={}",
            status.self_id,
            status.role,
            status.primary_id,
            status.ready,
            status.node_count
        );
        for node in &status.nodes {
            tracing::debug!(
                "  node {} role={} healthy={} address={}",
                node.id,
                node.role,
                node.healthy,
                node.address
            );
        }
    }
}
