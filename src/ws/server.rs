use super::config::WsConfig;
use crate::common::{FixtureServer, ProtocolKind, Session};
use crate::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{Instrument, debug, error, info, warn};

/// WebSocket fixture server
///
/// Echoes every inbound message back verbatim, in order, one at a time. A
/// text message equal to the configured sentinel closes the socket with the
/// configured application close code and reason instead of being echoed;
/// nothing is echoed after the sentinel.
///
/// # Examples
///
/// ```no_run
/// use fixsrv::ws::{WsConfig, WsServer};
/// use fixsrv::common::FixtureServer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = WsServer::new(WsConfig::default());
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct WsServer {
    config: WsConfig,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl WsServer {
    /// Creates a new WebSocket fixture server with the given configuration
    pub fn new(config: WsConfig) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Handles a single socket connection
    async fn handle_connection(stream: TcpStream, addr: SocketAddr, config: WsConfig) -> Result<()> {
        let mut ws = accept_async(stream).await?;
        debug!(%addr, "WebSocket handshake complete");

        let session = Session::open(ProtocolKind::Socket);
        let result = Self::drive_socket(&mut ws, &session, &config).await;
        session.release();
        result
    }

    /// Echoes messages until the socket closes from either side
    ///
    /// Strict ordering: each inbound message is fully echoed before the next
    /// one is read.
    async fn drive_socket(
        ws: &mut WebSocketStream<TcpStream>,
        session: &Session,
        config: &WsConfig,
    ) -> Result<()> {
        while let Some(message) = ws.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    // Transport disconnects are cleanup triggers, not faults.
                    debug!(session = %session.id(), error = %e, "Socket ended without close handshake");
                    return Ok(());
                }
            };

            match message {
                Message::Text(text) => {
                    info!(session = %session.id(), message = %text, "Received");

                    if text == config.close_sentinel {
                        let frame = close_frame(config.close_code, config.close_reason.clone());
                        info!(session = %session.id(), code = config.close_code, reason = %config.close_reason, "Sentinel received, closing socket");
                        if let Err(e) = ws.close(Some(frame)).await {
                            debug!(session = %session.id(), error = %e, "Close on dropped socket");
                            return Ok(());
                        }

                        // Drain until the close handshake completes; nothing
                        // is echoed past the sentinel.
                        while let Some(remaining) = ws.next().await {
                            match remaining {
                                Ok(Message::Close(frame)) => log_peer_close(session, frame.as_ref()),
                                Ok(_) => {}
                                Err(_) => break,
                            }
                        }
                        return Ok(());
                    }

                    if let Err(e) = ws.send(Message::Text(text)).await {
                        debug!(session = %session.id(), error = %e, "Echo on closed socket");
                        return Ok(());
                    }
                }
                Message::Binary(payload) => {
                    if let Err(e) = ws.send(Message::Binary(payload)).await {
                        debug!(session = %session.id(), error = %e, "Echo on closed socket");
                        return Ok(());
                    }
                }
                Message::Ping(payload) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Message::Close(frame) => {
                    log_peer_close(session, frame.as_ref());
                    return Ok(());
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        Ok(())
    }
}

#[async_trait]
impl FixtureServer for WsServer {
    /// Starts the WebSocket fixture server and listens for connections
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        info!(address = %listener.local_addr()?, "WebSocket fixture server listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            connection_count.fetch_add(1, Ordering::SeqCst);
                            let config = self.config.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, addr, config).instrument(span).await {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                                connection_count.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("WebSocket fixture server stopped");
        Ok(())
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}

fn close_frame(code: u16, reason: String) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    }
}

fn log_peer_close(session: &Session, frame: Option<&CloseFrame<'_>>) {
    match frame {
        Some(frame) => {
            info!(session = %session.id(), code = u16::from(frame.code), reason = %frame.reason, "Socket closed by peer");
        }
        None => {
            info!(session = %session.id(), "Socket closed by peer without close frame");
        }
    }
}
