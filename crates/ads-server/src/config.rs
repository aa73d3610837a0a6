//! Server configuration.

use std::time::Duration;

/// Configuration for the ADS server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Outbound responses buffered per connection before sends wait.
    pub response_buffer_size: usize,
    /// Maximum concurrent ADS connections. `None` means unlimited.
    pub max_connections: Option<usize>,
    /// Maximum concurrent HTTP/2 streams per client connection.
    pub max_concurrent_streams: Option<u32>,
    /// Keepalive interval.
    pub keepalive_interval: Option<Duration>,
    /// Keepalive timeout.
    pub keepalive_timeout: Option<Duration>,
    /// How long shutdown waits for connections to drain.
    pub grace_period: Duration,
    /// Serve `grpc.health.v1.Health`.
    pub enable_health: bool,
    /// Identifier stamped on every response.
    pub control_plane_id: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            response_buffer_size: 16,
            max_connections: None,
            max_concurrent_streams: Some(100),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_timeout: Some(Duration::from_secs(10)),
            grace_period: Duration::from_secs(10),
            enable_health: true,
            control_plane_id: None,
        }
    }
}
