use super::auth::ProxyCredentials;
use super::config::ProxyConfig;
use super::server::ProxyServer;
use crate::common::FixtureServer;
use crate::common::test_utils::reserve_local_addr;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn test_config_default() {
    let config = ProxyConfig::default();
    assert_eq!(config.max_connections, 100);
    assert!(config.credentials.is_none());
}

/// One-response upstream the proxy forwards to
async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buffer = [0u8; 2048];
                let mut request = Vec::new();
                loop {
                    let n = stream.read(&mut buffer).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    request.extend_from_slice(&buffer[..n]);
                    if request.windows(4).any(|window| window == b"\r\n\r\n") {
                        break;
                    }
                }
                let body = "upstream says hi";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

async fn spawn_proxy(credentials: Option<ProxyCredentials>) -> (tokio::task::JoinHandle<crate::Result<()>>, SocketAddr) {
    let addr = reserve_local_addr().await.unwrap();
    let server = ProxyServer::new(ProxyConfig {
        bind_addr: addr,
        credentials,
        ..ProxyConfig::default()
    });
    let handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (handle, addr)
}

async fn send_and_collect(proxy: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).to_string()
}

#[tokio::test]
async fn open_proxy_forwards_absolute_form_requests() {
    let upstream = spawn_upstream().await;
    let (handle, proxy) = spawn_proxy(None).await;

    let request = format!("GET http://{upstream}/hello HTTP/1.1\r\nHost: {upstream}\r\n\r\n");
    let response = send_and_collect(proxy, &request).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("upstream says hi"), "{response}");

    handle.abort();
}

#[tokio::test]
async fn open_proxy_tunnels_connect_requests() {
    let upstream = spawn_upstream().await;
    let (handle, proxy) = spawn_proxy(None).await;

    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(format!("CONNECT {upstream} HTTP/1.1\r\nHost: {upstream}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    // Read the proxy's acknowledgement before speaking through the tunnel.
    let mut acknowledged = Vec::new();
    let mut byte = [0u8; 1];
    while !acknowledged.windows(4).any(|window| window == b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        acknowledged.push(byte[0]);
    }
    let acknowledged = String::from_utf8_lossy(&acknowledged).to_string();
    assert!(acknowledged.starts_with("HTTP/1.1 200 Connection Established"), "{acknowledged}");

    stream.write_all(b"GET /tunneled HTTP/1.1\r\nHost: upstream\r\n\r\n").await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.ends_with("upstream says hi"), "{response}");

    handle.abort();
}

#[tokio::test]
async fn gated_proxy_denies_missing_credentials_before_forwarding() {
    let upstream = spawn_upstream().await;
    let (handle, proxy) = spawn_proxy(Some(ProxyCredentials::new("a", "b"))).await;

    let request = format!("GET http://{upstream}/hello HTTP/1.1\r\nHost: {upstream}\r\n\r\n");
    let response = send_and_collect(proxy, &request).await;
    assert!(response.starts_with("HTTP/1.1 407 Proxy Authentication Required"), "{response}");
    assert!(response.contains("Proxy-Authenticate: Basic"), "{response}");
    assert!(!response.contains("upstream says hi"), "{response}");

    handle.abort();
}

#[tokio::test]
async fn gated_proxy_denies_wrong_credentials() {
    let upstream = spawn_upstream().await;
    let (handle, proxy) = spawn_proxy(Some(ProxyCredentials::new("a", "b"))).await;

    let credential = STANDARD.encode("a:wrong");
    let request = format!(
        "GET http://{upstream}/hello HTTP/1.1\r\nHost: {upstream}\r\nProxy-Authorization: Basic {credential}\r\n\r\n"
    );
    let response = send_and_collect(proxy, &request).await;
    assert!(response.starts_with("HTTP/1.1 407 Proxy Authentication Required"), "{response}");
    assert!(response.contains("rejected"), "{response}");

    handle.abort();
}

#[tokio::test]
async fn gated_proxy_forwards_matching_credentials() {
    let upstream = spawn_upstream().await;
    let (handle, proxy) = spawn_proxy(Some(ProxyCredentials::new("a", "b"))).await;

    let credential = STANDARD.encode("a:b");
    let request = format!(
        "GET http://{upstream}/hello HTTP/1.1\r\nHost: {upstream}\r\nProxy-Authorization: Basic {credential}\r\n\r\n"
    );
    let response = send_and_collect(proxy, &request).await;
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.ends_with("upstream says hi"), "{response}");

    handle.abort();
}

#[tokio::test]
async fn unreachable_destination_reports_bad_gateway() {
    // Reserve a port and leave it closed.
    let dead = reserve_local_addr().await.unwrap();
    let (handle, proxy) = spawn_proxy(None).await;

    let request = format!("GET http://{dead}/ HTTP/1.1\r\nHost: {dead}\r\n\r\n");
    let response = send_and_collect(proxy, &request).await;
    assert!(response.starts_with("HTTP/1.1 502 Bad Gateway"), "{response}");
    assert!(response.contains("Could not reach"), "{response}");

    handle.abort();
}
