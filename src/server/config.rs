//! Hub configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// How long a connection may stay unclassified before it is dropped
    pub unclassified_timeout: Duration,

    /// Disconnect a classified connection after this much inbound silence
    pub heartbeat_timeout: Duration,

    /// How often the liveness monitor pings and sweeps
    pub sweep_interval: Duration,

    /// Outbound queue depth per viewer; overflow disconnects the viewer
    pub viewer_queue_bound: usize,

    /// JSONL backup file for finalized entries (None = no backup)
    pub backup_path: Option<PathBuf>,

    /// Stats logging interval
    pub stats_interval: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9000".parse().unwrap(),
            max_connections: 0, // Unlimited
            unclassified_timeout: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            viewer_queue_bound: 256,
            backup_path: None,
            stats_interval: Duration::from_secs(30),
            tcp_nodelay: true, // Low latency matters more than throughput here
        }
    }
}

impl HubConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the unclassified-connection timeout
    pub fn unclassified_timeout(mut self, timeout: Duration) -> Self {
        self.unclassified_timeout = timeout;
        self
    }

    /// Set the heartbeat timeout
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the liveness sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the per-viewer outbound queue bound (floor of 1)
    pub fn viewer_queue_bound(mut self, bound: usize) -> Self {
        self.viewer_queue_bound = bound.max(1);
        self
    }

    /// Write a JSONL backup of finalized entries to `path`
    pub fn backup_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(path.into());
        self
    }

    /// Set the stats logging interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.unclassified_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(config.viewer_queue_bound, 256);
        assert!(config.backup_path.is_none());
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9100".parse().unwrap();
        let config = HubConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9100);
    }

    #[test]
    fn test_builder_queue_bound_floor() {
        let config = HubConfig::default().viewer_queue_bound(0);

        assert_eq!(config.viewer_queue_bound, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = HubConfig::default()
            .bind(addr)
            .max_connections(50)
            .unclassified_timeout(Duration::from_secs(5))
            .heartbeat_timeout(Duration::from_secs(20))
            .sweep_interval(Duration::from_secs(1))
            .viewer_queue_bound(64)
            .backup_path("transcripts.jsonl")
            .stats_interval(Duration::from_secs(10));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.unclassified_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(20));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.viewer_queue_bound, 64);
        assert_eq!(config.backup_path, Some(PathBuf::from("transcripts.jsonl")));
        assert_eq!(config.stats_interval, Duration::from_secs(10));
    }
}
