use crate::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Reserves a free loopback address for a fixture server under test
///
/// Binds port 0 to learn a free port, then drops the listener so the server
/// can bind the same address.
pub async fn reserve_local_addr() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}
