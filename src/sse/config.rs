use std::net::SocketAddr;
use std::time::Duration;

/// How the event-stream driver assigns counters to connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseMode {
    /// Each connection gets its own counter starting at 1. `GET /` streams
    /// until the client disconnects; `GET /closed-by-server` resets the
    /// transport after [`SseConfig::forced_close_after`] emissions.
    PerConnection,
    /// All connections are fed from one process-wide counter starting at 0;
    /// a new connection continues from the counter's current value.
    SharedCounter,
}

/// Configuration for the SSE fixture server
///
/// # Examples
///
/// ```
/// use fixsrv::sse::{SseConfig, SseMode};
/// use std::time::Duration;
///
/// let config = SseConfig {
///     bind_addr: "127.0.0.1:3000".parse().unwrap(),
///     max_connections: 100,
///     mode: SseMode::PerConnection,
///     tick_interval: Duration::from_secs(1),
///     forced_close_after: 4,
/// };
/// ```
///
/// Using the default configuration:
///
/// ```
/// use fixsrv::sse::SseConfig;
///
/// let config = SseConfig::default();
/// assert_eq!(config.forced_close_after, 4);
/// ```
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Counter assignment scenario
    pub mode: SseMode,
    /// Period between two emissions on one connection
    pub tick_interval: Duration,
    /// Number of emissions after which the forced route resets the transport
    pub forced_close_after: u64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Use port 0 for testing
            max_connections: 100,
            mode: SseMode::PerConnection,
            tick_interval: Duration::from_secs(1),
            forced_close_after: 4,
        }
    }
}
