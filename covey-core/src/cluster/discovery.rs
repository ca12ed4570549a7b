//! Peer discovery
//!
//! Resolves the service's logical name to the set of replica addresses.
//! Deployments normally provide a DNS alias that resolves to every
//! replica; when that fails (partial DNS outage, bare-metal setups) the
//! node falls back to probing the /24 around its own address for anything
//! that answers `/cluster/status`.

use super::state::Cluster;
use super::{HASHED_ID_RANGE, MAX_SCAN_HOSTS};
use crate::error::{Error, Result};
use futures::stream::StreamExt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::lookup_host;

impl Cluster {
    /// Run one discovery pass and refresh the node registry
    ///
    /// Previously-known nodes that did not answer this pass are marked
    /// unhealthy; nodes unseen past the stale threshold are evicted. The
    /// registry is only locked for the final bookkeeping section, never
    /// during name resolution or probing.
    pub async fn discover_peers(&self) -> Result<()> {
        let current_ip = match &self.config.advertise_ip {
            Some(ip) => ip.clone(),
            None => local_ipv4()?,
        };

        let discovered = match self.resolve_service().await {
            Ok(ips) => {
                tracing::info!("Discovered {} nodes via DNS", ips.len());
                ips
            }
            Err(e) => {
                tracing::warn!(
                    "DNS lookup failed for service {}: {}. Falling back to subnet probing",
                    self.config.service_name,
                    e
                );
                let ips = self.scan_subnet(&current_ip).await?;
                tracing::info!("Discovered {} nodes via subnet probing", ips.len());
                ips
            }
        };

        let mut inner = self.inner.write();
        inner.mark_all_unseen();
        for ip in &discovered {
            let id = node_id_for(ip);
            inner.observe(id, format!("http://{}:{}", ip, self.config.service_port));

            if *ip == current_ip {
                if inner.self_id != Some(id) {
                    tracing::info!("Local node identified as id {}", id);
                }
                inner.self_id = Some(id);
            }
        }
        inner.cleanup_stale(self.config.stale_threshold);

        Ok(())
    }

    /// Resolve the service name to peer IPs via platform DNS
    async fn resolve_service(&self) -> Result<Vec<String>> {
        let addrs =
            lookup_host((self.config.service_name.as_str(), self.config.service_port)).await?;

        let mut ips: Vec<String> = addrs.map(|addr| addr.ip().to_string()).collect();
        ips.sort();
        ips.dedup();

        if ips.is_empty() {
            return Err(Error::discovery(format!(
                "service name {} resolved to no addresses",
                self.config.service_name
            )));
        }
        Ok(ips)
    }

    /// Probe every host in the configured (or inferred) subnet
    ///
    /// Probes run with bounded concurrency and a per-probe timeout; after
    /// the overall collection deadline whatever answered so far is
    /// accepted. An empty result is an error.
    async fn scan_subnet(&self, current_ip: &str) -> Result<Vec<String>> {
        let cidr = self.config.subnet.clone().unwrap_or_else(|| {
            let inferred = infer_subnet(current_ip);
            tracing::info!("No subnet configured, inferred {}", inferred);
            inferred
        });

        let candidates = hosts_in_cidr(&cidr)?;
        tracing::info!("Probing {} addresses in {}", candidates.len(), cidr);

        let deadline = tokio::time::Instant::now() + self.config.scan_deadline;
        let probes = candidates.into_iter().map(|ip| {
            let http = self.http.clone();
            let port = self.config.service_port;
            let timeout = self.config.probe_timeout;
            async move {
                if probe_node(&http, &ip, port, timeout).await {
                    Some(ip)
                } else {
                    None
                }
            }
        });
        let mut stream = futures::stream::iter(probes).buffer_unordered(self.config.probe_concurrency);

        let mut responsive = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Ok(Some(Some(ip))) => {
                    tracing::debug!("Found responsive node at {}", ip);
                    responsive.push(ip);
                }
                Ok(Some(None)) => {}
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Subnet scan deadline reached, accepting {} responses",
                        responsive.len()
                    );
                    break;
                }
            }
        }

        if responsive.is_empty() {
            Err(Error::discovery("no responsive nodes found in subnet range"))
        } else {
            Ok(responsive)
        }
    }
}

/// Check whether a candidate address hosts a cluster node
async fn probe_node(http: &reqwest::Client, ip: &str, port: u16, timeout: Duration) -> bool {
    let url = format!("http://{}:{}/cluster/status", ip, port);

    let response = match http.get(&url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(_) => return false,
    };
    if !response.status().is_success() {
        return false;
    }

    // Anything can answer 200 on a busy subnet; require the status shape
    match response.json::<serde_json::Value>().await {
        Ok(body) => body.get("self_id").is_some(),
        Err(_) => false,
    }
}

/// Derive the deterministic node id for an address
///
/// IPv4 addresses combine their last two octets, so the same peer always
/// yields the same id and ids stay unique within a /16. Anything else is
/// hashed into a fixed range.
pub fn node_id_for(address: &str) -> u32 {
    if let Ok(ip) = address.parse::<Ipv4Addr>() {
        let [_, _, third, fourth] = ip.octets();
        return u32::from(third) * 256 + u32::from(fourth);
    }

    address
        .chars()
        .fold(0u32, |hash, ch| hash.wrapping_mul(31).wrapping_add(ch as u32))
        % HASHED_ID_RANGE
}

/// Infer the /24 surrounding the given IPv4 address
pub fn infer_subnet(ip: &str) -> String {
    match ip.parse::<Ipv4Addr>() {
        Ok(ip) => {
            let [a, b, c, _] = ip.octets();
            format!("{}.{}.{}.0/24", a, b, c)
        }
        Err(_) => "10.0.0.0/24".to_string(),
    }
}

/// Enumerate host addresses in a CIDR range, network/broadcast excluded
pub fn hosts_in_cidr(cidr: &str) -> Result<Vec<String>> {
    let (base, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| Error::config(format!("invalid CIDR {}", cidr)))?;
    let base: Ipv4Addr = base
        .parse()
        .map_err(|_| Error::config(format!("invalid CIDR base address in {}", cidr)))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| Error::config(format!("invalid CIDR prefix in {}", cidr)))?;
    if !(8..=30).contains(&prefix) {
        return Err(Error::config(format!("unsupported CIDR prefix /{}", prefix)));
    }

    let mask = u32::MAX << (32 - prefix);
    let network = u32::from(base) & mask;
    let broadcast = network | !mask;

    Ok(((network + 1)..broadcast)
        .take(MAX_SCAN_HOSTS)
        .map(|addr| Ipv4Addr::from(addr).to_string())
        .collect())
}

/// Best-effort local IPv4 discovery
///
/// Connecting a UDP socket sends no packets; it only asks the kernel
/// which source address would be used for an outbound route.
pub fn local_ipv4() -> Result<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip().to_string())
}
