//! Cluster configuration
//!
//! Loaded from environment variables the same way the deployment wires the
//! service into its overlay network: a logical service name that DNS
//! resolves to every replica, the shared listen port, and the data-file
//! location. Everything else has fixed operational defaults.

use crate::retry::BackoffPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Cluster coordination configuration
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Logical service name all replicas share (DNS alias)
    pub service_name: String,
    /// Port every replica listens on
    pub service_port: u16,
    /// Directory holding the local LMDB store
    pub data_dir: PathBuf,
    /// LMDB map size in bytes
    pub map_size: usize,
    /// Optional CIDR override for the subnet-probing fallback
    pub subnet: Option<String>,
    /// Optional override for the locally advertised IP
    pub advertise_ip: Option<String>,
    /// Timeout for a single discovery probe
    pub probe_timeout: Duration,
    /// Overall deadline for a subnet scan pass
    pub scan_deadline: Duration,
    /// Maximum concurrent discovery probes
    pub probe_concurrency: usize,
    /// Discovery + election cadence
    pub election_interval: Duration,
    /// Nodes unseen for longer than this are evicted
    pub stale_threshold: Duration,
    /// Delay before a demoted node starts pulling a snapshot
    pub stabilization_delay: Duration,
    /// Timeout for replication, sync and forwarding HTTP calls
    pub http_timeout: Duration,
    /// Retry policy for the full-sync path
    pub sync_retry: BackoffPolicy,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            service_name: "backend-service".to_string(),
            service_port: 3000,
            data_dir: PathBuf::from("./data"),
            map_size: 128 * 1024 * 1024,
            subnet: None,
            advertise_ip: None,
            probe_timeout: Duration::from_secs(2),
            scan_deadline: Duration::from_secs(5),
            probe_concurrency: 20,
            election_interval: Duration::from_secs(10),
            stale_threshold: Duration::from_secs(30),
            stabilization_delay: Duration::from_secs(8),
            http_timeout: Duration::from_secs(30),
            sync_retry: BackoffPolicy::default(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized variables: `SERVICE_NAME`, `PORT`, `DATA_DIR`,
    /// `NETWORK_SUBNET` (CIDR), `ADVERTISE_IP`. Anything unset falls back
    /// to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                config.service_port = port;
            } else {
                tracing::warn!("Ignoring unparsable PORT value: {}", port);
            }
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(subnet) = std::env::var("NETWORK_SUBNET") {
            config.subnet = Some(subnet);
        }
        if let Ok(ip) = std::env::var("ADVERTISE_IP") {
            config.advertise_ip = Some(ip);
        }

        config
    }

    /// Set the service name
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the service port
    pub fn with_service_port(mut self, port: u16) -> Self {
        self.service_port = port;
        self
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the election cadence
    pub fn with_election_interval(mut self, interval: Duration) -> Self {
        self.election_interval = interval;
        self
    }

    /// Set the post-demotion stabilization delay
    pub fn with_stabilization_delay(mut self, delay: Duration) -> Self {
        self.stabilization_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.service_name, "backend-service");
        assert_eq!(config.service_port, 3000);
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.scan_deadline, Duration::from_secs(5));
        assert_eq!(config.probe_concurrency, 20);
        assert_eq!(config.election_interval, Duration::from_secs(10));
        assert_eq!(config.stale_threshold, Duration::from_secs(30));
        assert!(config.subnet.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ClusterConfig::default()
            .with_service_name("app")
            .with_service_port(4000)
            .with_data_dir("/tmp/covey")
            .with_election_interval(Duration::from_secs(5))
            .with_stabilization_delay(Duration::from_millis(100));

        assert_eq!(config.service_name, "app");
        assert_eq!(config.service_port, 4000);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/covey"));
        assert_eq!(config.election_interval, Duration::from_secs(5));
        assert_eq!(config.stabilization_delay, Duration::from_millis(100));
    }
}
