use super::config::TlsConfig;
use super::gate::{CertGate, render_response};
use crate::common::{FixtureServer, ProtocolKind, Session, read_request_head, write_text_response};
use crate::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{Instrument, debug, error, info, warn};

/// Mutual-auth gate fixture server
///
/// Terminates TLS with a requested-but-optional client certificate, then
/// gates every request on a three-way evaluation of the presented chain:
/// authorized chains reach the greeting handler, untrusted chains are named
/// in a 403, missing certificates get a generic 401.
///
/// # Examples
///
/// ```no_run
/// use fixsrv::tls::{TlsConfig, TlsGateServer};
/// use fixsrv::common::FixtureServer;
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TlsConfig::from_pem_files(
///         "127.0.0.1:3002".parse()?,
///         Path::new("certs/server.crt"),
///         Path::new("certs/server.key"),
///         Path::new("certs/ca.crt"),
///     )?;
///     let server = TlsGateServer::new(config);
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct TlsGateServer {
    config: TlsConfig,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl TlsGateServer {
    /// Creates a new mutual-auth gate server with the given configuration
    pub fn new(config: TlsConfig) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Handles a single gated connection
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        acceptor: TlsAcceptor,
        gate: Arc<CertGate>,
    ) -> Result<()> {
        let mut tls_stream = match acceptor.accept(stream).await {
            Ok(tls_stream) => tls_stream,
            Err(e) => {
                // Handshake failures are the client's test scenario, not ours.
                debug!(%addr, error = %e, "TLS handshake failed");
                return Ok(());
            }
        };

        let session = Session::open(ProtocolKind::Gated);
        let result = Self::serve_request(&mut tls_stream, &session, &gate).await;
        session.release();

        let _ = tls_stream.shutdown().await;
        result
    }

    async fn serve_request(
        tls_stream: &mut TlsStream<TcpStream>,
        session: &Session,
        gate: &CertGate,
    ) -> Result<()> {
        let head = read_request_head(tls_stream).await?;

        // Presented chain, if any; owned so the borrow on the connection ends
        // before we write.
        let peer_certs: Option<Vec<_>> = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .map(|certs| certs.to_vec());

        let decision = gate.evaluate(peer_certs.as_deref());
        info!(session = %session.id(), method = %head.method, path = %head.path, decision = ?decision, "Certificate gate decided");

        let (status, body) = render_response(&decision);
        write_text_response(tls_stream, status, &[], &body).await
    }
}

#[async_trait]
impl FixtureServer for TlsGateServer {
    /// Starts the mutual-auth gate server and listens for connections
    async fn run(&self) -> Result<()> {
        let gate = Arc::new(CertGate::new(&self.config.trusted_roots)?);

        let server_config = rustls::ServerConfig::builder()
            .with_client_cert_verifier(gate.handshake_verifier())
            .with_single_cert(self.config.cert_chain.clone(), self.config.key.clone_key())?;
        let acceptor = TlsAcceptor::from(Arc::new(server_config));

        let listener = TcpListener::bind(self.config.bind_addr).await?;

        info!(address = %listener.local_addr()?, "Mutual-auth gate server listening");

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
                            let acceptor = acceptor.clone();
                            let gate = gate.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, addr, acceptor, gate).instrument(span).await {
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

        info!("Mutual-auth gate server stopped");
        Ok(())
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
