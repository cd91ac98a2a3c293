use super::auth::{ProxyDecision, authorize};
use super::config::ProxyConfig;
use crate::common::{FixtureServer, ProtocolKind, RequestHead, Session, read_request_head, write_text_response};
use crate::Result;
use async_trait::async_trait;
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncWriteExt, copy_bidirectional};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tracing::{Instrument, debug, error, info, warn};

const PROXY_AUTHENTICATE: (&str, &str) = ("Proxy-Authenticate", "Basic realm=\"fixsrv\"");

// Hop-by-hop headers a forward proxy consumes rather than relays.
const STRIPPED_HEADERS: &[&str] = &["proxy-authorization", "proxy-connection"];

/// Forward-proxy fixture server
///
/// Relays arbitrary HTTP requests to the destination they name: CONNECT
/// requests become byte tunnels, absolute-form requests are rewritten to
/// origin form and spliced. With credentials configured, requests must carry
/// a matching `Proxy-Authorization: Basic` header before anything is
/// forwarded.
///
/// # Examples
///
/// ```no_run
/// use fixsrv::proxy::{ProxyConfig, ProxyCredentials, ProxyServer};
/// use fixsrv::common::FixtureServer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = ProxyServer::new(ProxyConfig {
///         credentials: Some(ProxyCredentials::new("a", "b")),
///         ..ProxyConfig::default()
///     });
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct ProxyServer {
    config: ProxyConfig,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl ProxyServer {
    /// Creates a new proxy fixture server with the given configuration
    pub fn new(config: ProxyConfig) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Handles a single proxied request
    async fn handle_connection(mut stream: TcpStream, addr: SocketAddr, config: ProxyConfig) -> Result<()> {
        let head = read_request_head(&mut stream).await?;
        let session = Session::open(ProtocolKind::Proxy);
        let result = Self::serve_request(&mut stream, &session, head, &config).await;
        session.release();
        debug!(%addr, "Proxy request finished");
        result
    }

    async fn serve_request(
        stream: &mut TcpStream,
        session: &Session,
        head: RequestHead,
        config: &ProxyConfig,
    ) -> Result<()> {
        if let Some(expected) = &config.credentials {
            let decision = authorize(head.header("proxy-authorization"), expected);
            info!(session = %session.id(), decision = ?decision, "Authorization decided");

            let body = match decision {
                ProxyDecision::Allowed => None,
                ProxyDecision::DeniedNoCredential => {
                    Some("Proxy authentication required, but no credentials were provided.")
                }
                ProxyDecision::DeniedBadCredential => {
                    Some("Proxy authentication failed: credentials rejected.")
                }
            };
            if let Some(body) = body {
                write_text_response(
                    stream,
                    StatusCode::PROXY_AUTHENTICATION_REQUIRED,
                    &[PROXY_AUTHENTICATE],
                    body,
                )
                .await?;
                return Ok(());
            }
        }

        if head.method == "CONNECT" {
            Self::tunnel(stream, session, head).await
        } else {
            Self::forward(stream, session, head).await
        }
    }

    /// CONNECT tunnel: splice raw bytes between client and destination
    async fn tunnel(stream: &mut TcpStream, session: &Session, head: RequestHead) -> Result<()> {
        let target = head.path.clone();

        let mut upstream = match TcpStream::connect(&target).await {
            Ok(upstream) => upstream,
            Err(e) => {
                info!(session = %session.id(), %target, error = %e, "Destination unreachable");
                let body = format!("Could not reach {target}: {e}");
                write_text_response(stream, StatusCode::BAD_GATEWAY, &[], &body).await?;
                return Ok(());
            }
        };

        stream.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await?;
        stream.flush().await?;
        info!(session = %session.id(), %target, "Tunnel established");

        if let Err(e) = copy_bidirectional(stream, &mut upstream).await {
            // Either side dropping the tunnel is a normal end, not a fault.
            debug!(session = %session.id(), error = %e, "Tunnel ended");
        }
        Ok(())
    }

    /// Absolute-form request: rewrite to origin form and splice
    async fn forward(stream: &mut TcpStream, session: &Session, head: RequestHead) -> Result<()> {
        let Some((target, origin_form)) = destination_of(&head.path) else {
            let body = format!("Forward proxy requires an absolute-form request, got {}", head.path);
            write_text_response(stream, StatusCode::BAD_REQUEST, &[], &body).await?;
            return Ok(());
        };

        let mut upstream = match TcpStream::connect(&target).await {
            Ok(upstream) => upstream,
            Err(e) => {
                info!(session = %session.id(), %target, error = %e, "Destination unreachable");
                let body = format!("Could not reach {target}: {e}");
                write_text_response(stream, StatusCode::BAD_GATEWAY, &[], &body).await?;
                return Ok(());
            }
        };

        let mut rewritten: Vec<u8> = Vec::with_capacity(head.buffered.len());
        rewritten.extend_from_slice(format!("{} {} HTTP/1.1\r\n", head.method, origin_form).as_bytes());
        for (name, value) in head.headers() {
            if STRIPPED_HEADERS.iter().any(|stripped| name.eq_ignore_ascii_case(stripped)) {
                continue;
            }
            rewritten.extend_from_slice(name.as_bytes());
            rewritten.extend_from_slice(b": ");
            rewritten.extend_from_slice(value);
            rewritten.extend_from_slice(b"\r\n");
        }
        rewritten.extend_from_slice(b"\r\n");
        rewritten.extend_from_slice(head.body_prefix());

        upstream.write_all(&rewritten).await?;
        upstream.flush().await?;
        info!(session = %session.id(), %target, method = %head.method, "Forwarding request");

        if let Err(e) = copy_bidirectional(stream, &mut upstream).await {
            debug!(session = %session.id(), error = %e, "Relay ended");
        }
        Ok(())
    }
}

/// Resolves an absolute-form request target to `(host:port, origin-form path)`
fn destination_of(path: &str) -> Option<(String, String)> {
    let uri: http::Uri = path.parse().ok()?;
    let host = uri.host()?;
    let port = uri.port_u16().unwrap_or(80);
    let origin_form = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    Some((format!("{host}:{port}"), origin_form))
}

#[async_trait]
impl FixtureServer for ProxyServer {
    /// Starts the proxy fixture server and listens for connections
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        info!(
            address = %listener.local_addr()?,
            gated = self.config.credentials.is_some(),
            "Proxy fixture server listening"
        );

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

        info!("Proxy fixture server stopped");
        Ok(())
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
