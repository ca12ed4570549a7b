//! Error types for Covey Core

use thiserror::Error;

/// Result type alias using the Covey Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the coordination layer
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from store or snapshot file handling
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LMDB/heed database errors
    #[error("Database error: {0}")]
    Database(#[from] heed::Error),

    /// Outbound HTTP errors (probes, replication, sync, forwarding)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Peer discovery errors (DNS and subnet scanning both failed)
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Leader election errors
    #[error("Election error: {0}")]
    Election(String),

    /// Replication delivery or apply errors
    #[error("Replication error: {0}")]
    Replication(String),

    /// Full-sync transfer errors
    #[error("Sync error: {0}")]
    Sync(String),

    /// Protocol violations (mutation from a non-recognized primary,
    /// sync requested from a non-primary). Map to a 4xx at the edge.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Local store errors (missing row, duplicate id, closed store)
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create an election error
    pub fn election(msg: impl Into<String>) -> Self {
        Self::Election(msg.into())
    }

    /// Create a replication error
    pub fn replication(msg: impl Into<String>) -> Self {
        Self::Replication(msg.into())
    }

    /// Create a sync error
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync(msg.into())
    }

    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error is a protocol violation that should surface as
    /// a client error (4xx) rather than a server failure.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}
