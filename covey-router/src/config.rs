//! Router configuration

use std::time::Duration;

/// Edge router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Logical name of the frontend service pool (DNS alias)
    pub service_name: String,
    /// Port the frontend instances listen on
    pub service_port: u16,
    /// Path probed on each instance to judge health
    pub health_path: String,
    /// Port this router listens on
    pub listen_port: u16,
    /// How often the frontend pool is re-discovered
    pub discovery_interval: Duration,
    /// How often every endpoint is health-checked
    pub health_interval: Duration,
    /// Timeout for a single health probe
    pub health_timeout: Duration,
    /// Timeout for a proxied request
    pub proxy_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            service_name: "frontend".to_string(),
            service_port: 5173,
            health_path: "/".to_string(),
            listen_port: 8080,
            discovery_interval: Duration::from_secs(10),
            health_interval: Duration::from_secs(5),
            health_timeout: Duration::from_secs(3),
            proxy_timeout: Duration::from_secs(30),
        }
    }
}

impl RouterConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized: `SERVICE_NAME`, `SERVICE_PORT`, `HEALTH_PATH`,
    /// `ROUTER_PORT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(port) = std::env::var("SERVICE_PORT") {
            if let Ok(port) = port.parse() {
                config.service_port = port;
            } else {
                tracing::warn!("Ignoring unparsable SERVICE_PORT value: {}", port);
            }
        }
        if let Ok(path) = std::env::var("HEALTH_PATH") {
            config.health_path = path;
        }
        if let Ok(port) = std::env::var("ROUTER_PORT") {
            if let Ok(port) = port.parse() {
                config.listen_port = port;
            } else {
                tracing::warn!("Ignoring unparsable ROUTER_PORT value: {}", port);
            }
        }

        config
    }
}
