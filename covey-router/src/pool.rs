//! Frontend endpoint pool
//!
//! Discovers frontend instances through the same DNS alias the swarm
//! publishes for them, health-checks every instance on its own timer, and
//! hands out healthy endpoints round-robin. An endpoint that falls out of
//! DNS is dropped; one that merely fails its probe is kept and skipped
//! until it recovers.

use crate::config::RouterConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::MissedTickBehavior;

/// A discovered frontend instance
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Resolved IP address
    pub ip: String,
    /// Base URL requests are proxied to
    pub url: String,
    /// Result of the most recent health probe
    pub healthy: bool,
    /// When the endpoint was last probed
    pub last_check: Instant,
}

struct PoolInner {
    endpoints: Vec<Endpoint>,
    cursor: usize,
}

/// Discovered frontend pool with round-robin selection
pub struct EndpointPool {
    config: RouterConfig,
    http: reqwest::Client,
    inner: RwLock<PoolInner>,
}

impl EndpointPool {
    /// Build the pool and its outbound HTTP client
    pub fn new(config: RouterConfig) -> anyhow::Result<Arc<Self>> {
        let http = reqwest::Client::builder().build()?;
        Ok(Arc::new(Self {
            config,
            http,
            inner: RwLock::new(PoolInner {
                endpoints: Vec::new(),
                cursor: 0,
            }),
        }))
    }

    /// Outbound HTTP client shared with the proxy handler
    pub fn client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Router configuration
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Re-resolve the frontend service name and update the pool
    pub async fn discover(&self) {
        let lookup =
            tokio::net::lookup_host((self.config.service_name.as_str(), self.config.service_port))
                .await;

        let ips = match lookup {
            Ok(addrs) => {
                let mut ips: Vec<String> = addrs.map(|addr| addr.ip().to_string()).collect();
                ips.sort();
                ips.dedup();
                ips
            }
            Err(e) => {
                tracing::warn!(
                    "DNS lookup failed for {}: {}",
                    self.config.service_name,
                    e
                );
                return;
            }
        };

        if ips.is_empty() {
            tracing::warn!("No addresses found for {}", self.config.service_name);
            return;
        }

        tracing::debug!("Discovered {} frontend addresses", ips.len());
        self.apply_discovered(ips);
    }

    /// Merge a resolved address set into the pool
    ///
    /// New endpoints start unhealthy until the health loop confirms them;
    /// endpoints no longer resolvable are removed outright.
    fn apply_discovered(&self, ips: Vec<String>) {
        let mut inner = self.inner.write();

        for ip in &ips {
            if !inner.endpoints.iter().any(|e| &e.ip == ip) {
                let url = format!("http://{}:{}", ip, self.config.service_port);
                tracing::info!("New frontend discovered: {}", url);
                inner.endpoints.push(Endpoint {
                    ip: ip.clone(),
                    url,
                    healthy: false,
                    last_check: Instant::now(),
                });
            }
        }

        inner.endpoints.retain(|endpoint| {
            let keep = ips.contains(&endpoint.ip);
            if !keep {
                tracing::info!("Removing frontend no longer in DNS: {}", endpoint.url);
            }
            keep
        });
    }

    /// Probe every endpoint's health path concurrently and flip flags
    pub async fn check_health(&self) {
        let endpoints: Vec<Endpoint> = self.inner.read().endpoints.clone();
        if endpoints.is_empty() {
            return;
        }

        let probes = endpoints.iter().map(|endpoint| {
            let url = format!("{}{}", endpoint.url, self.config.health_path);
            let http = self.http.clone();
            let timeout = self.config.health_timeout;
            async move {
                match http.get(&url).timeout(timeout).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(_) => false,
                }
            }
        });
        let results = futures::future::join_all(probes).await;

        let mut healthy_count = 0;
        let mut inner = self.inner.write();
        for (probed, healthy) in endpoints.iter().zip(results) {
            if let Some(endpoint) = inner.endpoints.iter_mut().find(|e| e.ip == probed.ip) {
                if endpoint.healthy && !healthy {
                    tracing::warn!("Frontend unhealthy: {}", endpoint.url);
                }
                if !endpoint.healthy && healthy {
                    tracing::info!("Frontend recovered: {}", endpoint.url);
                }
                endpoint.healthy = healthy;
                endpoint.last_check = Instant::now();
                if healthy {
                    healthy_count += 1;
                }
            }
        }

        tracing::info!(
            "Health check: {}/{} frontends healthy",
            healthy_count,
            inner.endpoints.len()
        );
    }

    /// Next healthy endpoint in rotation order, skipping unhealthy ones
    pub fn next_healthy(&self) -> Option<Endpoint> {
        let mut inner = self.inner.write();

        let healthy: Vec<usize> = inner
            .endpoints
            .iter()
            .enumerate()
            .filter(|(_, e)| e.healthy)
            .map(|(index, _)| index)
            .collect();

        if healthy.is_empty() {
            return None;
        }

        let index = healthy[inner.cursor % healthy.len()];
        inner.cursor = inner.cursor.wrapping_add(1);
        Some(inner.endpoints[index].clone())
    }

    /// Pool status for the status endpoint
    pub fn status(&self) -> serde_json::Value {
        let inner = self.inner.read();
        let healthy = inner.endpoints.iter().filter(|e| e.healthy).count();

        serde_json::json!({
            "service": self.config.service_name,
            "total": inner.endpoints.len(),
            "healthy": healthy,
            "endpoints": inner.endpoints.iter().map(|e| serde_json::json!({
                "ip": e.ip,
                "url": e.url,
                "healthy": e.healthy,
                "last_check_secs_ago": e.last_check.elapsed().as_secs(),
            })).collect::<Vec<_>>(),
            "last_updated": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Spawn the discovery and health-check timers
    pub fn spawn_loops(self: Arc<Self>) {
        let pool = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.discovery_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Startup already ran the initial discovery pass
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pool.discover().await;
            }
        });

        let pool = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.health_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pool.check_health().await;
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, ip: &str, healthy: bool) {
        let mut inner = self.inner.write();
        inner.endpoints.push(Endpoint {
            ip: ip.to_string(),
            url: format!("http://{}:{}", ip, self.config.service_port),
            healthy,
            last_check: Instant::now(),
        });
    }

    #[cfg(test)]
    pub(crate) fn inject_url(&self, ip: &str, url: &str, healthy: bool) {
        let mut inner = self.inner.write();
        inner.endpoints.push(Endpoint {
            ip: ip.to_string(),
            url: url.to_string(),
            healthy,
            last_check: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::get};
    use std::collections::HashMap;

    #[test]
    fn test_round_robin_skips_unhealthy() {
        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        pool.inject("10.0.0.1", true);
        pool.inject("10.0.0.2", false);
        pool.inject("10.0.0.3", true);
        pool.inject("10.0.0.4", true);

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..6 {
            let endpoint = pool.next_healthy().unwrap();
            *counts.entry(endpoint.ip).or_default() += 1;
        }

        // Each healthy endpoint visited exactly twice, the unhealthy never
        assert_eq!(counts.get("10.0.0.1"), Some(&2));
        assert_eq!(counts.get("10.0.0.3"), Some(&2));
        assert_eq!(counts.get("10.0.0.4"), Some(&2));
        assert_eq!(counts.get("10.0.0.2"), None);
    }

    #[test]
    fn test_no_healthy_endpoints_yields_none() {
        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        assert!(pool.next_healthy().is_none());

        pool.inject("10.0.0.1", false);
        assert!(pool.next_healthy().is_none());
    }

    #[test]
    fn test_apply_discovered_adds_and_removes() {
        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        pool.apply_discovered(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert_eq!(pool.status()["total"], 2);
        // New endpoints wait for a health pass before taking traffic
        assert_eq!(pool.status()["healthy"], 0);

        pool.apply_discovered(vec!["10.0.0.2".to_string(), "10.0.0.3".to_string()]);
        let status = pool.status();
        assert_eq!(status["total"], 2);
        let ips: Vec<&str> = status["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["ip"].as_str().unwrap())
            .collect();
        assert_eq!(ips, vec!["10.0.0.2", "10.0.0.3"]);
    }

    #[tokio::test]
    async fn test_check_health_flips_flags() {
        let app = Router::new().route("/", get(|| async { "OK" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        pool.inject_url("alive", &format!("http://{}", addr), false);
        // Port 1 refuses connections
        pool.inject_url("dead", "http://127.0.0.1:1", true);

        pool.check_health().await;

        let status = pool.status();
        assert_eq!(status["healthy"], 1);
        for endpoint in status["endpoints"].as_array().unwrap() {
            match endpoint["ip"].as_str().unwrap() {
                "alive" => assert_eq!(endpoint["healthy"], true),
                "dead" => assert_eq!(endpoint["healthy"], false),
                other => panic!("unexpected endpoint {}", other),
            }
        }
    }

    #[test]
    fn test_status_shape() {
        let pool = EndpointPool::new(RouterConfig::default()).unwrap();
        pool.inject("10.0.0.1", true);

        let status = pool.status();
        assert_eq!(status["service"], "frontend");
        assert_eq!(status["total"], 1);
        assert_eq!(status["healthy"], 1);
        assert!(status.get("last_updated").is_some());
    }
}
