//! Server configuration

use covey_core::ClusterConfig;
use std::net::SocketAddr;

/// Server configuration: the bind address plus the cluster settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind: SocketAddr,
    /// Cluster coordination configuration
    pub cluster: ClusterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let cluster = ClusterConfig::default();
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], cluster.service_port)),
            cluster,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// The bind port follows the cluster's `PORT`: every replica listens
    /// on the same port its peers probe.
    pub fn from_env() -> Self {
        let cluster = ClusterConfig::from_env();
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], cluster.service_port)),
            cluster,
        }
    }
}
