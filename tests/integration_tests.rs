use color_eyre::eyre::Result;
use fixsrv::common::FixtureServer;
use fixsrv::common::test_utils::reserve_local_addr;
use fixsrv::sse::{SseConfig, SseServer};
use fixsrv::ws::{WsConfig, WsServer};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

async fn spawn_sse_server() -> Result<(tokio::task::JoinHandle<fixsrv::Result<()>>, SocketAddr)> {
    let addr = reserve_local_addr().await?;
    let server = SseServer::new(SseConfig {
        bind_addr: addr,
        tick_interval: Duration::from_millis(20),
        ..SseConfig::default()
    });
    let handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok((handle, addr))
}

async fn open_stream(addr: SocketAddr, path: &str) -> Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nAccept: text/event-stream\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    Ok(stream)
}

async fn read_counter_values(stream: &mut TcpStream, count: usize) -> Result<Vec<u64>> {
    let mut collected = String::new();
    let mut buffer = [0u8; 1024];
    while parse_counter_values(&collected).len() < count {
        let n = stream.read(&mut buffer).await?;
        assert!(n > 0, "stream ended early: {collected}");
        collected.push_str(&String::from_utf8_lossy(&buffer[..n]));
    }
    Ok(parse_counter_values(&collected))
}

fn parse_counter_values(text: &str) -> Vec<u64> {
    text.split("\n\n")
        .filter(|chunk| chunk.contains("event: counter"))
        .filter_map(|chunk| {
            chunk
                .lines()
                .find_map(|line| line.strip_prefix("data: "))
                .and_then(|data| data.parse().ok())
        })
        .collect()
}

#[tokio::test]
async fn graceful_stream_counts_up_without_gaps() -> Result<()> {
    let (handle, addr) = spawn_sse_server().await?;

    let mut stream = open_stream(addr, "/").await?;
    let values = read_counter_values(&mut stream, 6).await?;
    assert_eq!(&values[..6], &[1, 2, 3, 4, 5, 6]);

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn forced_stream_emits_exactly_four_events_then_resets() -> Result<()> {
    let (handle, addr) = spawn_sse_server().await?;

    let mut stream = open_stream(addr, "/closed-by-server").await?;
    let mut collected = Vec::new();
    let mut buffer = [0u8; 1024];
    let clean_end = loop {
        match stream.read(&mut buffer).await {
            Ok(0) => break true,
            Ok(n) => collected.extend_from_slice(&buffer[..n]),
            Err(_) => break false,
        }
    };

    let text = String::from_utf8_lossy(&collected);
    let values = parse_counter_values(&text);
    assert_eq!(values, vec![1, 2, 3, 4], "{text}");
    assert!(!clean_end, "expected a transport reset, got an orderly end of stream");

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn concurrent_streams_have_independent_counters() -> Result<()> {
    let (handle, addr) = spawn_sse_server().await?;

    let mut first = open_stream(addr, "/").await?;
    tokio::time::sleep(Duration::from_millis(45)).await;
    let mut second = open_stream(addr, "/").await?;

    // The late joiner still starts from 1 even though the first stream is
    // already past it.
    let second_values = read_counter_values(&mut second, 3).await?;
    let first_values = read_counter_values(&mut first, 3).await?;
    assert_eq!(&second_values[..3], &[1, 2, 3]);
    assert_eq!(&first_values[..3], &[1, 2, 3]);

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn socket_echoes_then_closes_on_the_sentinel() -> Result<()> {
    let addr = reserve_local_addr().await?;
    let server = WsServer::new(WsConfig {
        bind_addr: addr,
        ..WsConfig::default()
    });
    let handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}")).await?;

    // Pipeline the whole scenario before reading anything back; ordering
    // must hold regardless.
    ws.send(Message::Text("a".to_string())).await?;
    ws.send(Message::Text("b".to_string())).await?;
    ws.send(Message::Text("close".to_string())).await?;

    assert_eq!(ws.next().await.unwrap()?, Message::Text("a".to_string()));
    assert_eq!(ws.next().await.unwrap()?, Message::Text("b".to_string()));
    match ws.next().await.unwrap()? {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::from(4000));
            assert_eq!(frame.reason, "Closed by server");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
    assert!(ws.next().await.is_none(), "nothing may follow the close");

    handle.abort();
    Ok(())
}
