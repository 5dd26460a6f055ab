//! End-to-end tests against a live relay on a loopback port.

use std::time::Duration;
use sync_client::{RelayClient, RelayEvent};
use sync_protocol::{DemoStatus, RelayMessage};
use sync_server::{handlers, Config};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn start_relay() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port,
        ..Config::default()
    };

    tokio::spawn(handlers::serve(listener, config, std::future::pending()));
    port
}

async fn next_message(events: &mut broadcast::Receiver<RelayEvent>) -> RelayMessage {
    loop {
        match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
            RelayEvent::Message(message) => return message,
            RelayEvent::Connected => continue,
            RelayEvent::Disconnected => panic!("relay link dropped"),
        }
    }
}

async fn connected_client(port: u16) -> (RelayClient, broadcast::Receiver<RelayEvent>) {
    let client = RelayClient::new("127.0.0.1", port);
    let mut events = client.subscribe();

    assert!(client.ensure_connected().await.unwrap());
    assert_eq!(events.recv().await.unwrap(), RelayEvent::Connected);
    assert_eq!(next_message(&mut events).await, RelayMessage::Ready);

    (client, events)
}

async fn create_room(
    client: &RelayClient,
    events: &mut broadcast::Receiver<RelayEvent>,
) -> String {
    assert!(client.send(&RelayMessage::CreateRoom).unwrap());
    match next_message(events).await {
        RelayMessage::RoomCreated { room_id } => room_id,
        other => panic!("expected room_created, got {other:?}"),
    }
}

#[tokio::test]
async fn test_room_lifecycle() {
    let port = start_relay().await;

    let (host, mut host_events) = connected_client(port).await;
    let room_id = create_room(&host, &mut host_events).await;
    assert_eq!(room_id.len(), sync_core::room::ROOM_ID_LENGTH);

    let (viewer, mut viewer_events) = connected_client(port).await;
    viewer.send(&RelayMessage::join_room(room_id.clone())).unwrap();
    assert_eq!(
        next_message(&mut viewer_events).await,
        RelayMessage::room_joined(room_id.clone())
    );

    // Demo state from the creator reaches the viewer.
    let status = DemoStatus::playing(1200, 64000, 33.5, "match.dem");
    host.send(&RelayMessage::room_demo_state(status.clone())).unwrap();
    assert_eq!(
        next_message(&mut viewer_events).await,
        RelayMessage::room_demo_state(status)
    );

    // The creator leaving tears the room down for everyone.
    host.disconnect();
    assert_eq!(
        next_message(&mut viewer_events).await,
        RelayMessage::destroy_room(room_id.clone())
    );

    // The room is gone.
    viewer.send(&RelayMessage::join_room(room_id)).unwrap();
    assert_eq!(
        next_message(&mut viewer_events).await,
        RelayMessage::room_failed_to_join("Room does not exist.")
    );
}

#[tokio::test]
async fn test_viewer_cannot_report_demo_state() {
    let port = start_relay().await;

    let (host, mut host_events) = connected_client(port).await;
    let room_id = create_room(&host, &mut host_events).await;

    let (viewer, mut viewer_events) = connected_client(port).await;
    viewer.send(&RelayMessage::join_room(room_id.clone())).unwrap();
    next_message(&mut viewer_events).await;

    viewer
        .send(&RelayMessage::room_demo_state(DemoStatus::idle()))
        .unwrap();

    // The next thing the host sees is the viewer leaving, not a demo state.
    viewer.disconnect();
    assert!(matches!(
        next_message(&mut host_events).await,
        RelayMessage::LeftRoom { room_id: left, .. } if left == room_id
    ));
}

#[tokio::test]
async fn test_malformed_frames_do_not_break_the_relay() {
    let port = start_relay().await;

    let (mut sender, mut receiver) =
        sync_transport::websocket::connect("127.0.0.1", port, WAIT).await.unwrap();
    assert_eq!(
        timeout(WAIT, receiver.recv()).await.unwrap().unwrap().as_deref(),
        Some(r#"{"type":"ready"}"#)
    );

    sender.send_text("not json".to_string()).await.unwrap();
    sender.send_text(r#"{"type":"nonsense"}"#.to_string()).await.unwrap();
    sender.send_text(r#"{"type":"create_room"}"#.to_string()).await.unwrap();

    let reply = timeout(WAIT, receiver.recv()).await.unwrap().unwrap().unwrap();
    assert!(reply.contains("room_created"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let port = start_relay().await;
    let (_client, _events) = connected_client(port).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    let health: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["rooms"], 0);
}
