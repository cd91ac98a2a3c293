use thiserror::Error;

/// Error types for the fixsrv library
#[derive(Error, Debug)]
pub enum FixtureError {
    /// Transport-level errors (bind, accept, read, write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request head parsing errors
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),

    /// WebSocket protocol errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// TLS configuration and handshake errors
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// UTF-8 encoding errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type for the fixsrv library
pub type Result<T> = std::result::Result<T, FixtureError>;

pub mod common;
pub mod proxy;
pub mod sse;
pub mod tls;
pub mod ws;

// Re-export main types for convenience
pub use common::{FixtureServer, ProtocolKind, Session, SessionId};
pub use proxy::{ProxyConfig, ProxyCredentials, ProxyServer};
pub use sse::{SseConfig, SseMode, SseServer};
pub use tls::{TlsConfig, TlsGateServer};
pub use ws::{WsConfig, WsServer};
