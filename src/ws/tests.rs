use super::config::WsConfig;
use super::server::WsServer;
use crate::common::FixtureServer;
use crate::common::test_utils::reserve_local_addr;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

#[tokio::test]
async fn test_config_default() {
    let config = WsConfig::default();
    assert_eq!(config.max_connections, 100);
    assert_eq!(config.close_sentinel, "close");
    assert_eq!(config.close_code, 4000);
    assert_eq!(config.close_reason, "Closed by server");
}

async fn spawn_server() -> (tokio::task::JoinHandle<crate::Result<()>>, SocketAddr) {
    let addr = reserve_local_addr().await.unwrap();
    let server = WsServer::new(WsConfig {
        bind_addr: addr,
        ..WsConfig::default()
    });
    let handle = tokio::spawn(async move { server.run().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (handle, addr)
}

#[tokio::test]
async fn echoes_text_messages_in_order() {
    let (handle, addr) = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    for payload in ["a", "b", "42"] {
        ws.send(Message::Text(payload.to_string())).await.unwrap();
        let echoed = ws.next().await.unwrap().unwrap();
        assert_eq!(echoed, Message::Text(payload.to_string()));
    }

    ws.close(None).await.unwrap();
    handle.abort();
}

#[tokio::test]
async fn echoes_binary_messages_verbatim() {
    let (handle, addr) = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    let payload = vec![0u8, 159, 146, 150];
    ws.send(Message::Binary(payload.clone())).await.unwrap();
    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Binary(payload));

    ws.close(None).await.unwrap();
    handle.abort();
}

#[tokio::test]
async fn sentinel_closes_with_application_code_and_reason() {
    let (handle, addr) = spawn_server().await;
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    ws.send(Message::Text("a".to_string())).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap(), Message::Text("a".to_string()));

    ws.send(Message::Text("close".to_string())).await.unwrap();
    let close = ws.next().await.unwrap().unwrap();
    match close {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::from(4000));
            assert_eq!(frame.reason, "Closed by server");
        }
        other => panic!("expected close frame, got {other:?}"),
    }

    // The sentinel itself is not echoed and nothing follows the close.
    assert!(ws.next().await.is_none());
    handle.abort();
}

#[tokio::test]
async fn concurrent_sockets_do_not_cross_traffic() {
    let (handle, addr) = spawn_server().await;
    let (mut first, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    let (mut second, _) = connect_async(format!("ws://{addr}")).await.unwrap();

    first.send(Message::Text("x-first".to_string())).await.unwrap();
    second.send(Message::Text("x-second".to_string())).await.unwrap();

    assert_eq!(
        first.next().await.unwrap().unwrap(),
        Message::Text("x-first".to_string())
    );
    assert_eq!(
        second.next().await.unwrap().unwrap(),
        Message::Text("x-second".to_string())
    );

    first.close(None).await.unwrap();
    second.close(None).await.unwrap();
    handle.abort();
}
