use crate::Result;
use async_trait::async_trait;

/// Common trait for fixture servers
///
/// This trait defines the common interface that all scenario servers
/// (SSE, WebSocket, proxy, TLS gate) must implement.
#[async_trait]
pub trait FixtureServer {
    /// Starts the server and listens for connections until shut down
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}
