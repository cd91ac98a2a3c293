use super::config::{SseConfig, SseMode};
use super::frame;
use crate::common::{FixtureServer, ProtocolKind, Session, read_request_head, write_text_response};
use crate::Result;
use async_trait::async_trait;
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{Instrument, debug, error, info, warn};

/// Event name carried by every emission
pub const EVENT_NAME: &str = "counter";

// Counter start values are driver identity, not tuning knobs: per-connection
// streams emit 1,2,3,... while the shared stream starts from 0.
const PER_CONNECTION_FIRST_VALUE: u64 = 1;
const SHARED_FIRST_VALUE: u64 = 0;

/// Which endpoint a streaming connection landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// `GET /` in per-connection mode: stream until the client disconnects
    Graceful,
    /// `GET /closed-by-server`: abrupt transport reset after the threshold
    Forced,
    /// Any `GET` in shared-counter mode
    Shared,
}

/// How a streaming connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    ClosedByClient,
    ClosedByServer,
}

/// SSE fixture server
///
/// Emits a periodically incrementing counter event to each streaming
/// connection. In [`SseMode::PerConnection`] the `/` endpoint runs until the
/// client disconnects and `/closed-by-server` abandons the stream with a
/// transport reset after a fixed number of emissions; in
/// [`SseMode::SharedCounter`] every connection continues a single
/// process-wide counter.
///
/// # Examples
///
/// ```no_run
/// use fixsrv::sse::{SseConfig, SseServer};
/// use fixsrv::common::FixtureServer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = SseServer::new(SseConfig::default());
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct SseServer {
    config: SseConfig,
    shared_counter: Arc<AtomicU64>,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl SseServer {
    /// Creates a new SSE fixture server with the given configuration
    pub fn new(config: SseConfig) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            shared_counter: Arc::new(AtomicU64::new(SHARED_FIRST_VALUE)),
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Handles a single streaming connection
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        config: SseConfig,
        shared_counter: Arc<AtomicU64>,
    ) -> Result<()> {
        let head = read_request_head(&mut stream).await?;
        let (method, path) = (head.method, head.path);

        let route = match (config.mode, method.as_str(), path.as_str()) {
            (SseMode::SharedCounter, "GET", _) => Route::Shared,
            (SseMode::PerConnection, "GET", "/") => Route::Graceful,
            (SseMode::PerConnection, "GET", "/closed-by-server") => Route::Forced,
            _ => {
                debug!(%addr, %method, %path, "No stream endpoint at this route");
                write_text_response(&mut stream, StatusCode::NOT_FOUND, &[], "Not Found").await?;
                return Ok(());
            }
        };

        stream.write_all(frame::STREAM_RESPONSE_HEAD.as_bytes()).await?;
        stream.flush().await?;

        let session = Session::open(ProtocolKind::Stream);
        let end = Self::drive_stream(&mut stream, &session, route, &config, &shared_counter).await?;

        if end == StreamEnd::ClosedByServer {
            // Linger(0) turns the close into a reset: the peer must observe
            // an abandoned stream, not an orderly end.
            stream.set_linger(Some(Duration::ZERO))?;
            info!(session = %session.id(), "Resetting transport");
        }
        session.release();

        Ok(())
    }

    /// Emits counter events until the connection ends from either side
    async fn drive_stream(
        stream: &mut TcpStream,
        session: &Session,
        route: Route,
        config: &SseConfig,
        shared_counter: &AtomicU64,
    ) -> Result<StreamEnd> {
        let cancel = session.cancellation_token();
        let (mut reader, mut writer) = stream.split();

        // setInterval semantics: the first emission lands one full period
        // after accept, not immediately.
        let mut ticker = time::interval_at(
            Instant::now() + config.tick_interval,
            config.tick_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut counter = PER_CONNECTION_FIRST_VALUE;
        let mut emitted: u64 = 0;
        let mut drain = [0u8; 512];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(StreamEnd::ClosedByClient);
                }
                read_result = reader.read(&mut drain) => {
                    match read_result {
                        Ok(0) | Err(_) => {
                            debug!(session = %session.id(), "Client closed stream");
                            return Ok(StreamEnd::ClosedByClient);
                        }
                        // Stray bytes from the client are not part of the
                        // protocol; drain and keep streaming.
                        Ok(_) => {}
                    }
                }
                _ = ticker.tick() => {
                    // Reserving the value and emitting it happen on this one
                    // task, so no two ticks can observe the same value; the
                    // shared counter reserves with a single atomic step.
                    let value = match route {
                        Route::Shared => shared_counter.fetch_add(1, Ordering::SeqCst),
                        Route::Graceful | Route::Forced => {
                            let value = counter;
                            counter += 1;
                            value
                        }
                    };

                    let event = frame::encode_event(EVENT_NAME, value);
                    if let Err(e) = writer.write_all(event.as_bytes()).await {
                        // Client went away between the counter read and the
                        // send; swallow it, teardown follows.
                        debug!(session = %session.id(), error = %e, "Emission on closed connection");
                        return Ok(StreamEnd::ClosedByClient);
                    }
                    if let Err(e) = writer.flush().await {
                        debug!(session = %session.id(), error = %e, "Emission on closed connection");
                        return Ok(StreamEnd::ClosedByClient);
                    }
                    info!(session = %session.id(), value, "Sent counter event");

                    emitted += 1;
                    if route == Route::Forced && emitted >= config.forced_close_after {
                        return Ok(StreamEnd::ClosedByServer);
                    }
                }
            }
        }
    }

    /// Current value of the process-wide shared counter (next value to emit)
    pub fn shared_counter_value(&self) -> u64 {
        self.shared_counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FixtureServer for SseServer {
    /// Starts the SSE fixture server and listens for connections
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        info!(address = %listener.local_addr()?, mode = ?self.config.mode, "SSE fixture server listening");

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
                            let shared_counter = self.shared_counter.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", %addr);
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, addr, config, shared_counter).instrument(span).await {
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

        info!("SSE fixture server stopped");
        Ok(())
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
