use std::collections::HashMap;

use tokio::sync::RwLock;

/// Caps the number of simultaneous WebSocket connections from a single IP,
/// so one misbehaving client can't exhaust the connection budget for
/// everyone else.
pub struct ConnectionLimiter {
    connections_by_ip: RwLock<HashMap<String, usize>>,
    max_connections_per_ip: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections_per_ip: usize) -> Self {
        Self {
            connections_by_ip: RwLock::new(HashMap::new()),
            max_connections_per_ip,
        }
    }

    /// Attempts to reserve a connection slot for `ip`. Returns `false` (and
    /// reserves nothing) if `ip` is already at its limit.
    pub async fn try_acquire(&self, ip: &str) -> bool {
        let mut connections = self.connections_by_ip.write().await;
        let count = connections.entry(ip.to_string()).or_insert(0);
        if *count >= self.max_connections_per_ip {
            tracing::warn!(ip, count = *count, limit = self.max_connections_per_ip, "rejecting connection: per-ip limit reached");
            false
        } else {
            *count += 1;
            true
        }
    }

    pub async fn release(&self, ip: &str) {
        let mut connections = self.connections_by_ip.write().await;
        if let Some(count) = connections.get_mut(ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                connections.remove(ip);
            }
        }
    }

    pub async fn current(&self, ip: &str) -> usize {
        self.connections_by_ip
            .read()
            .await
            .get(ip)
            .copied()
            .unwrap_or(0)
    }

    /// Total reserved connection slots across all IPs.
    pub async fn total_connections(&self) -> usize {
        self.connections_by_ip.read().await.values().sum()
    }

    /// Number of distinct IPs currently holding at least one slot.
    pub async fn distinct_ips(&self) -> usize {
        self.connections_by_ip.read().await.len()
    }
}
