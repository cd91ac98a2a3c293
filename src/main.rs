use color_eyre::eyre::{Result, WrapErr};
use fixsrv::common::FixtureServer;
use fixsrv::proxy::{ProxyConfig, ProxyCredentials, ProxyServer};
use fixsrv::sse::{SseConfig, SseMode, SseServer};
use fixsrv::tls::{TlsConfig, TlsGateServer};
use fixsrv::ws::{WsConfig, WsServer};
use std::net::SocketAddr;
use std::path::Path;

use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("fixsrv=info")
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Default to the per-connection SSE scenario if none specified
    let scenario = args.get(1).map(|s| s.to_lowercase()).unwrap_or_else(|| "sse".to_string());

    match scenario.as_str() {
        "sse" => {
            let config = SseConfig {
                bind_addr: bind_addr(args.get(2), 3000),
                max_connections: 1000,
                ..SseConfig::default()
            };
            info!(address = %config.bind_addr, "Starting SSE fixture server");
            let server = SseServer::new(config);
            server.run().await.wrap_err("Failed to run SSE fixture server")?;
        }
        "sse-shared" => {
            let config = SseConfig {
                bind_addr: bind_addr(args.get(2), 3000),
                max_connections: 1000,
                mode: SseMode::SharedCounter,
                ..SseConfig::default()
            };
            info!(address = %config.bind_addr, "Starting shared-counter SSE fixture server");
            let server = SseServer::new(config);
            server.run().await.wrap_err("Failed to run SSE fixture server")?;
        }
        "ws" => {
            let config = WsConfig {
                bind_addr: bind_addr(args.get(2), 3001),
                max_connections: 1000,
                ..WsConfig::default()
            };
            info!(address = %config.bind_addr, "Starting WebSocket fixture server");
            let server = WsServer::new(config);
            server.run().await.wrap_err("Failed to run WebSocket fixture server")?;
        }
        "proxy" => {
            let config = ProxyConfig {
                bind_addr: bind_addr(args.get(2), 3004),
                max_connections: 1000,
                credentials: None,
            };
            info!(address = %config.bind_addr, "Starting open proxy fixture server");
            let server = ProxyServer::new(config);
            server.run().await.wrap_err("Failed to run proxy fixture server")?;
        }
        "proxy-auth" => {
            let config = ProxyConfig {
                bind_addr: bind_addr(args.get(2), 3005),
                max_connections: 1000,
                credentials: Some(ProxyCredentials::new("a", "b")),
            };
            info!(address = %config.bind_addr, "Starting gated proxy fixture server");
            let server = ProxyServer::new(config);
            server.run().await.wrap_err("Failed to run proxy fixture server")?;
        }
        "tls" => {
            let (Some(cert), Some(key), Some(ca)) = (args.get(2), args.get(3), args.get(4)) else {
                eprintln!("Usage: {} tls <cert.pem> <key.pem> <ca.pem> [port]", args[0]);
                std::process::exit(1);
            };

            rustls::crypto::ring::default_provider()
                .install_default()
                .ok();

            let mut config = TlsConfig::from_pem_files(
                bind_addr(args.get(5), 3002),
                Path::new(cert),
                Path::new(key),
                Path::new(ca),
            )
            .wrap_err("Failed to load TLS key material")?;
            config.max_connections = 1000;

            info!(address = %config.bind_addr, "Starting mutual-auth gate fixture server");
            let server = TlsGateServer::new(config);
            server.run().await.wrap_err("Failed to run mutual-auth gate fixture server")?;
        }
        _ => {
            eprintln!("Usage: {} [sse|sse-shared|ws|proxy|proxy-auth|tls] [args]", args[0]);
            eprintln!("  sse [port]                          # Per-connection counter streams (default port 3000)");
            eprintln!("  sse-shared [port]                   # Process-wide shared counter stream (default port 3000)");
            eprintln!("  ws [port]                           # Echo/close socket (default port 3001)");
            eprintln!("  proxy [port]                        # Open forward proxy (default port 3004)");
            eprintln!("  proxy-auth [port]                   # Credential-gated forward proxy (default port 3005)");
            eprintln!("  tls <cert> <key> <ca> [port]        # Mutual-auth gate (default port 3002)");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn bind_addr(port_arg: Option<&String>, default_port: u16) -> SocketAddr {
    let port = port_arg.and_then(|p| p.parse::<u16>().ok()).unwrap_or(default_port);
    format!("127.0.0.1:{port}").parse().unwrap()
}
