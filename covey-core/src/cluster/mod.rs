//! Cluster coordination layer
//!
//! Turns N identical service replicas into a primary/replica group:
//!
//! ```text
//! ┌─────────────────┐   replicate (HTTP)   ┌─────────────────┐
//! │     Primary     │ ───────────────────► │    Replica A    │
//! │                 │                      └─────────────────┘
//! │ Writes go here  │   replicate (HTTP)   ┌─────────────────┐
//! │                 │ ───────────────────► │    Replica B    │
//! └─────────────────┘                      └─────────────────┘
//!         ▲   full snapshot on join / primary change   │
//!         └──────────────────────────────────────────────┘
//! ```
//!
//! Every node runs the same loop: discover peers (DNS, falling back to
//! subnet probing), elect the lowest healthy id as primary, and keep the
//! local role/readiness in step. Replication is fire-and-forget and
//! at-most-once; a missed mutation is only repaired by the next full
//! snapshot sync.

pub mod discovery;
pub mod election;
pub mod registry;
pub mod replication;
pub mod state;
pub mod sync;

pub use registry::Node;
pub use replication::{MutationRecord, Replicator};
pub use state::{Cluster, ClusterStatus, NodeRole, NodeStatus};
pub use sync::{SyncRequest, SyncSnapshot};

/// Maximum host candidates considered in one subnet scan
pub const MAX_SCAN_HOSTS: usize = 254;

/// Node ids for non-IPv4 addresses are hashed into this range
pub const HASHED_ID_RANGE: u32 = 10_000;
