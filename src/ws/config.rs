use std::net::SocketAddr;

/// Configuration for the WebSocket fixture server
///
/// # Examples
///
/// ```
/// use fixsrv::ws::WsConfig;
///
/// let config = WsConfig {
///     bind_addr: "127.0.0.1:3001".parse().unwrap(),
///     max_connections: 100,
///     close_sentinel: "close".to_string(),
///     close_code: 4000,
///     close_reason: "Closed by server".to_string(),
/// };
/// ```
///
/// Using the default configuration:
///
/// ```
/// use fixsrv::ws::WsConfig;
///
/// let config = WsConfig::default();
/// assert_eq!(config.close_code, 4000);
/// ```
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Text payload that triggers a server-side close instead of an echo
    pub close_sentinel: String,
    /// Application close code sent in response to the sentinel
    pub close_code: u16,
    /// Close reason sent in response to the sentinel
    pub close_reason: String,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Use port 0 for testing
            max_connections: 100,
            close_sentinel: "close".to_string(),
            close_code: 4000,
            close_reason: "Closed by server".to_string(),
        }
    }
}
