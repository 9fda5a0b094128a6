//! Relay server over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use tictactoe::config::RelayConfig;
use tictactoe::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use tictactoe::network::server::GameServer;
use tictactoe::online::arbiter::RejectReason;
use tictactoe::online::store::InMemoryStore;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (Arc<GameServer>, SocketAddr) {
    start_with(RelayConfig::default()).await
}

async fn start_with(config: RelayConfig) -> (Arc<GameServer>, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(GameServer::new(config, Arc::new(InMemoryStore::new())));
    let running = server.clone();
    tokio::spawn(async move { running.serve(listener).await });
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    ws
}

async fn send(ws: &mut Client, msg: ClientMessage) {
    ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
}

async fn recv(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for relay")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

async fn hello(ws: &mut Client, id: Option<&str>) -> String {
    send(ws, ClientMessage::Hello { participant_id: id.map(str::to_string) }).await;
    match recv(ws).await {
        ServerMessage::Welcome { participant_id, .. } => participant_id,
        other => panic!("expected welcome, got {other:?}"),
    }
}

fn record_of(msg: ServerMessage) -> tictactoe::online::record::RecordDocument {
    match msg {
        ServerMessage::Record { record, .. } => record,
        other => panic!("expected record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_identity_is_required() {
    let (server, addr) = start().await;
    let mut ws = connect(addr).await;

    send(&mut ws, ClientMessage::CreateMatch).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error(e) if e.code == ErrorCode::NotIdentified));

    send(&mut ws, ClientMessage::Hello { participant_id: Some("draw".into()) }).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error(e) if e.code == ErrorCode::InvalidParticipant));

    let id = hello(&mut ws, Some("carol")).await;
    assert_eq!(id, "carol");

    send(&mut ws, ClientMessage::Hello { participant_id: None }).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error(e) if e.code == ErrorCode::AlreadyIdentified));

    send(&mut ws, ClientMessage::Ping { timestamp: 77 }).await;
    assert!(matches!(recv(&mut ws).await, ServerMessage::Pong { timestamp: 77, .. }));

    ws.send(Message::Text("{\"type\":\"nonsense\"}".into())).await.unwrap();
    assert!(matches!(recv(&mut ws).await, ServerMessage::Error(e) if e.code == ErrorCode::InvalidMessage));

    server.shutdown();
}

#[tokio::test]
async fn test_match_over_relay() {
    let (server, addr) = start().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    let alice_id = hello(&mut alice, None).await;
    let bob_id = hello(&mut bob, Some("bob")).await;
    assert_ne!(alice_id, bob_id);

    send(&mut alice, ClientMessage::CreateMatch).await;
    let (game_id, code) = match recv(&mut alice).await {
        ServerMessage::MatchCreated { game_id, code } => (game_id, code),
        other => panic!("expected match_created, got {other:?}"),
    };
    let waiting = record_of(recv(&mut alice).await);
    assert_eq!(waiting.status, "waiting");
    assert_eq!(waiting.host_id, alice_id);
    assert_eq!(waiting.code, code);

    send(&mut bob, ClientMessage::JoinMatch { code: "ZZZZZ".into() }).await;
    if code != "ZZZZZ" {
        assert_eq!(recv(&mut bob).await, ServerMessage::NotFound);
    }

    send(&mut bob, ClientMessage::JoinMatch { code: format!(" {} ", code.to_lowercase()) }).await;
    assert_eq!(recv(&mut bob).await, ServerMessage::Joined { game_id: game_id.clone() });
    let playing = record_of(recv(&mut bob).await);
    assert_eq!(playing.status, "playing");
    assert_eq!(playing.guest_id, "bob");
    assert_eq!(playing.current_turn, alice_id);
    assert_eq!(record_of(recv(&mut alice).await), playing);

    send(&mut bob, ClientMessage::SubmitMove { index: 0 }).await;
    assert_eq!(
        recv(&mut bob).await,
        ServerMessage::MoveRejected { reason: RejectReason::OutOfTurn }
    );

    send(&mut alice, ClientMessage::SubmitMove { index: 4 }).await;
    let seen_by_alice = record_of(recv(&mut alice).await);
    let seen_by_bob = record_of(recv(&mut bob).await);
    assert_eq!(seen_by_alice, seen_by_bob);
    assert_eq!(seen_by_bob.board[4], "X");
    assert_eq!(seen_by_bob.current_turn, "bob");

    send(&mut bob, ClientMessage::SyncRequest).await;
    assert_eq!(record_of(recv(&mut bob).await), seen_by_bob);

    // Leaving stops the feed but leaves the record alone.
    send(&mut bob, ClientMessage::Leave).await;
    send(&mut bob, ClientMessage::SubmitMove { index: 0 }).await;
    assert!(matches!(recv(&mut bob).await, ServerMessage::Error(e) if e.code == ErrorCode::NotInMatch));
    assert_eq!(server.record_count().await.unwrap(), 1);

    server.shutdown();
    assert!(matches!(recv(&mut alice).await, ServerMessage::Shutdown { .. }));
}

#[tokio::test]
async fn test_connection_limit() {
    let config = RelayConfig { max_connections: 1, ..Default::default() };
    let (server, addr) = start_with(config).await;

    let mut first = connect(addr).await;
    hello(&mut first, Some("first")).await;
    assert_eq!(server.connection_count().await, 1);
    assert_eq!(server.participant_count().await, 1);
    assert!(server.longest_idle().await.is_some_and(|idle| idle < Duration::from_secs(5)));

    let mut second = connect(addr).await;
    assert!(matches!(recv(&mut second).await, ServerMessage::Error(e) if e.code == ErrorCode::ServerOverloaded));

    server.shutdown();
}

/// Read until the relay closes the socket; false if it stays open.
async fn wait_closed(ws: &mut Client) -> bool {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next()).await {
            Err(_) => return false,
            Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let config = RelayConfig { idle_timeout: Duration::from_millis(100), ..Default::default() };
    let (server, addr) = start_with(config).await;
    let mut ws = connect(addr).await;
    hello(&mut ws, Some("dozy")).await;

    // Traffic keeps the connection open past the timeout.
    for timestamp in 0..6 {
        tokio::time::sleep(Duration::from_millis(40)).await;
        send(&mut ws, ClientMessage::Ping { timestamp }).await;
        assert!(matches!(recv(&mut ws).await, ServerMessage::Pong { .. }));
    }

    assert!(wait_closed(&mut ws).await);
    for _ in 0..50 {
        if server.connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.connection_count().await, 0);

    server.shutdown();
}

#[tokio::test]
async fn test_cleanup_expires_only_waiting_matches() {
    let config = RelayConfig {
        stale_waiting_after: Duration::from_millis(300),
        cleanup_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let (server, addr) = start_with(config).await;
    let mut host = connect(addr).await;
    let mut guest = connect(addr).await;
    let mut lonely = connect(addr).await;
    hello(&mut host, Some("host")).await;
    hello(&mut guest, Some("guest")).await;
    hello(&mut lonely, Some("lonely")).await;

    send(&mut host, ClientMessage::CreateMatch).await;
    let code = match recv(&mut host).await {
        ServerMessage::MatchCreated { code, .. } => code,
        other => panic!("expected match_created, got {other:?}"),
    };
    record_of(recv(&mut host).await);
    send(&mut guest, ClientMessage::JoinMatch { code }).await;
    assert!(matches!(recv(&mut guest).await, ServerMessage::Joined { .. }));
    assert_eq!(record_of(recv(&mut guest).await).status, "playing");

    send(&mut lonely, ClientMessage::CreateMatch).await;
    assert!(matches!(recv(&mut lonely).await, ServerMessage::MatchCreated { .. }));
    assert_eq!(server.record_count().await.unwrap(), 2);

    for _ in 0..100 {
        if server.record_count().await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.record_count().await.unwrap(), 1);

    send(&mut guest, ClientMessage::SyncRequest).await;
    let survivor = record_of(recv(&mut guest).await);
    assert_eq!(survivor.status, "playing");
    assert_eq!(survivor.host_id, "host");

    server.shutdown();
}
