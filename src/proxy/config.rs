use super::auth::ProxyCredentials;
use std::net::SocketAddr;

/// Configuration for the forward-proxy fixture server
///
/// # Examples
///
/// An open proxy that forwards unconditionally:
///
/// ```
/// use fixsrv::proxy::ProxyConfig;
///
/// let config = ProxyConfig::default();
/// assert!(config.credentials.is_none());
/// ```
///
/// A gated proxy requiring the fixed `a`/`b` pair:
///
/// ```
/// use fixsrv::proxy::{ProxyConfig, ProxyCredentials};
///
/// let config = ProxyConfig {
///     bind_addr: "127.0.0.1:3005".parse().unwrap(),
///     credentials: Some(ProxyCredentials::new("a", "b")),
///     ..ProxyConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Expected credential pair; `None` forwards unconditionally
    pub credentials: Option<ProxyCredentials>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Use port 0 for testing
            max_connections: 100,
            credentials: None,
        }
    }
}
