//! Covey Core - cluster coordination for embedded-store app services
//!
//! This crate turns a set of identical, stateless-looking service replicas
//! into a primary/replica group backed by per-node embedded LMDB stores:
//! - Peer discovery (DNS lookup with bounded subnet probing as fallback)
//! - Heuristic leader election (lowest node id wins)
//! - Write capture and fan-out replication to followers
//! - Full-database snapshot sync for new or demoted nodes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          HTTP surface (covey-server)          │
//! │  /cluster/status /cluster/replicate /cluster/sync │
//! └──────────────┬───────────────────────────────┘
//!                │
//! ┌──────────────┴───────────────────────────────┐
//! │           Coordination Layer                  │
//! │  (Registry, Discovery, Election, Sync)        │
//! └──────────────┬───────────────────────────────┘
//!                │
//! ┌──────────────┴───────────────────────────────┐
//! │            Table Store (LMDB)                 │
//! │  (rows, soft deletes, mutation observers)     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The election scheme is best-effort, with no quorum and no fencing.
//! Under a network partition two disjoint views can each elect their own
//! primary; this is a documented limitation, not a bug to paper over here.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cluster;
pub mod config;
pub mod error;
pub mod retry;
pub mod store;

pub use cluster::{Cluster, ClusterStatus, Node, NodeRole};
pub use config::ClusterConfig;
pub use error::{Error, Result};
pub use store::{FieldValue, MutationKind, MutationObserver, Row, TableStore};
