//! WebSocket Relay Server
//!
//! Hosts the shared record store for remote clients. Each connection gets a
//! participant id, may host or join one match at a time, and receives the
//! record of that match every time it changes.
//!
//! The relay adds no game rules of its own: creating and joining go through
//! [`MatchCoordinator`], moves through [`MoveArbiter`].

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::RelayConfig;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::online::arbiter::{MoveArbiter, MoveOutcome};
use crate::online::coordinator::{JoinOutcome, MatchCoordinator};
use crate::online::record::{GameId, ParticipantId};
use crate::online::store::{RecordStore, StoreError, Subscription};

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Record store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Connected client, as seen by the rest of the server.
struct ConnectedClient {
    /// Participant id (after hello).
    participant_id: Option<ParticipantId>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

/// State owned by one connection task.
struct Connection {
    addr: SocketAddr,
    participant: Option<ParticipantId>,
    game: Option<GameId>,
    /// Task forwarding the followed record to the client.
    feed: Option<JoinHandle<()>>,
    sender: mpsc::Sender<ServerMessage>,
}

impl Connection {
    /// Stop following the current match. The record itself is untouched.
    fn unfollow(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
        self.game = None;
    }

    /// Forward every value of `subscription` to the client.
    fn follow(&mut self, subscription: Subscription) {
        self.unfollow();
        self.game = Some(subscription.game_id().clone());
        let sender = self.sender.clone();
        self.feed = Some(tokio::spawn(forward_records(self.addr, subscription, sender)));
    }

    async fn send(&self, msg: ServerMessage) {
        let _ = self.sender.send(msg).await;
    }
}

async fn forward_records(
    addr: SocketAddr,
    mut subscription: Subscription,
    sender: mpsc::Sender<ServerMessage>,
) {
    let game_id = subscription.game_id().to_string();
    while let Some(record) = subscription.next().await {
        let msg = ServerMessage::Record {
            game_id: game_id.clone(),
            record: record.to_document(),
        };
        if sender.send(msg).await.is_err() {
            return;
        }
    }
    debug!("Record feed for {} closed ({})", game_id, addr);
}

/// Resolves once shutdown is requested or the server is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Shared handles passed to every connection.
#[derive(Clone)]
struct RelayContext {
    store: Arc<dyn RecordStore>,
    coordinator: Arc<MatchCoordinator>,
    arbiter: MoveArbiter,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    config: RelayConfig,
}

/// The relay server.
pub struct GameServer {
    /// Server configuration.
    config: RelayConfig,
    /// Shared handles.
    context: RelayContext,
    /// Shutdown signal.
    shutdown_tx: watch::Sender<bool>,
}

impl GameServer {
    /// Create a relay over `store`.
    pub fn new(config: RelayConfig, store: Arc<dyn RecordStore>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let context = RelayContext {
            coordinator: Arc::new(MatchCoordinator::new(store.clone())),
            arbiter: MoveArbiter::new(store.clone()),
            store,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            config: config.clone(),
        };

        Self { config, context, shutdown_tx }
    }

    /// Bind the configured address and run until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let local_addr = listener.local_addr()?;
        info!("Relay listening on {}", local_addr);

        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.context.store.clone(),
            self.config.clone(),
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.context.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(Self::reject_connection(stream, addr));
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let context = self.context.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) = Self::serve_connection(stream, addr, context.clone(), shutdown_rx).await {
                warn!("Connection {} failed: {}", addr, e);
            }
            let removed = context.clients.write().await.remove(&addr);
            let connected_for = removed.map(|c| c.connected_at.elapsed()).unwrap_or_default();
            info!("Client {} cleaned up after {:?}", addr, connected_for);
        });
    }

    /// Tell a client over the connection limit to go away.
    async fn reject_connection(stream: TcpStream, addr: SocketAddr) {
        let Ok(mut ws) = accept_async(stream).await else {
            return;
        };
        let msg = ServerMessage::error(ErrorCode::ServerOverloaded, "Too many connections");
        if let Ok(text) = msg.to_json() {
            let _ = ws.send(Message::Text(text)).await;
        }
        let _ = ws.close(None).await;
        debug!("Rejected {}", addr);
    }

    async fn serve_connection(
        stream: TcpStream,
        addr: SocketAddr,
        context: RelayContext,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), RelayError> {
        let ws_stream = accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

        // Register client
        {
            let mut clients = context.clients.write().await;
            clients.insert(addr, ConnectedClient {
                participant_id: None,
                connected_at: Instant::now(),
                last_activity: Instant::now(),
            });
        }

        // Spawn message sender task
        let sender_task = tokio::spawn(async move {
            while let Some(msg) = msg_rx.recv().await {
                let text = match msg.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            let _ = ws_sender.close().await;
        });

        let mut conn = Connection {
            addr,
            participant: None,
            game: None,
            feed: None,
            sender: msg_tx,
        };

        let idle = sleep(context.config.idle_timeout);
        tokio::pin!(idle);

        // Handle incoming messages
        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            idle.as_mut().reset(Instant::now() + context.config.idle_timeout);

                            let client_msg = match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    conn.send(ServerMessage::error(
                                        ErrorCode::InvalidMessage,
                                        "Invalid message format",
                                    )).await;
                                    continue;
                                }
                            };

                            // Update activity
                            {
                                let mut clients = context.clients.write().await;
                                if let Some(client) = clients.get_mut(&addr) {
                                    client.last_activity = Instant::now();
                                }
                            }

                            Self::handle_client_message(&mut conn, client_msg, &context).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            conn.send(ServerMessage::error(
                                ErrorCode::InvalidMessage,
                                "Binary frames are not supported",
                            )).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = &mut idle => {
                    info!("Closing idle client {}", addr);
                    break;
                }
                _ = shutdown_requested(&mut shutdown_rx) => {
                    conn.send(ServerMessage::Shutdown {
                        reason: "Server shutting down".to_string(),
                    }).await;
                    break;
                }
            }
        }

        // Leaving never touches the shared record.
        conn.unfollow();
        drop(conn);
        // Sender task drains what is queued, then closes the socket.
        if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
            debug!("Sender task for {} did not finish in time", addr);
        }

        Ok(())
    }

    /// Handle a client message.
    async fn handle_client_message(conn: &mut Connection, msg: ClientMessage, context: &RelayContext) {
        match msg {
            ClientMessage::Hello { participant_id } => {
                Self::handle_hello(conn, participant_id, context).await;
            }
            ClientMessage::Ping { timestamp } => {
                conn.send(ServerMessage::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis().max(0) as u64,
                }).await;
            }
            other => {
                let Some(me) = conn.participant.clone() else {
                    conn.send(ServerMessage::error(ErrorCode::NotIdentified, "Send hello first")).await;
                    return;
                };

                let result = match other {
                    ClientMessage::CreateMatch => Self::handle_create(conn, &me, context).await,
                    ClientMessage::JoinMatch { code } => Self::handle_join(conn, &me, &code, context).await,
                    ClientMessage::SubmitMove { index } => Self::handle_move(conn, &me, index, context).await,
                    ClientMessage::SyncRequest => Self::handle_sync(conn, context).await,
                    ClientMessage::Leave => {
                        debug!("Client {} left its match", conn.addr);
                        conn.unfollow();
                        Ok(())
                    }
                    ClientMessage::Hello { .. } | ClientMessage::Ping { .. } => Ok(()),
                };

                if let Err(e) = result {
                    warn!("Store error for {}: {}", conn.addr, e);
                    conn.send(store_error_message(&e)).await;
                }
            }
        }
    }

    /// Handle hello.
    async fn handle_hello(conn: &mut Connection, requested: Option<String>, context: &RelayContext) {
        if conn.participant.is_some() {
            conn.send(ServerMessage::error(ErrorCode::AlreadyIdentified, "Already identified")).await;
            return;
        }

        let participant = match requested {
            None => ParticipantId::generate(),
            Some(raw) => match ParticipantId::new(raw) {
                Some(id) => id,
                None => {
                    conn.send(ServerMessage::error(
                        ErrorCode::InvalidParticipant,
                        "Participant id is empty or reserved",
                    )).await;
                    return;
                }
            },
        };

        {
            let mut clients = context.clients.write().await;
            if let Some(client) = clients.get_mut(&conn.addr) {
                client.participant_id = Some(participant.clone());
            }
        }

        debug!("Client {} identified as {}", conn.addr, participant);
        conn.send(ServerMessage::Welcome {
            participant_id: participant.to_string(),
            server_version: crate::VERSION.to_string(),
        }).await;
        conn.participant = Some(participant);
    }

    /// Handle create_match.
    async fn handle_create(
        conn: &mut Connection,
        me: &ParticipantId,
        context: &RelayContext,
    ) -> Result<(), StoreError> {
        let handle = context.coordinator.create_match(me).await?;
        let subscription = context.store.subscribe(&handle.game_id).await?;

        conn.send(ServerMessage::MatchCreated {
            game_id: handle.game_id.to_string(),
            code: handle.record.code.to_string(),
        }).await;
        conn.follow(subscription);
        Ok(())
    }

    /// Handle join_match.
    async fn handle_join(
        conn: &mut Connection,
        me: &ParticipantId,
        code: &str,
        context: &RelayContext,
    ) -> Result<(), StoreError> {
        match context.coordinator.join_match(code, me).await? {
            JoinOutcome::Joined(handle) => {
                let subscription = context.store.subscribe(&handle.game_id).await?;
                conn.send(ServerMessage::Joined { game_id: handle.game_id.to_string() }).await;
                conn.follow(subscription);
            }
            JoinOutcome::NotFound => conn.send(ServerMessage::NotFound).await,
            JoinOutcome::OwnMatch => {
                conn.send(ServerMessage::error(ErrorCode::OwnMatch, "Cannot join your own match")).await;
            }
        }
        Ok(())
    }

    /// Handle submit_move.
    async fn handle_move(
        conn: &mut Connection,
        me: &ParticipantId,
        index: usize,
        context: &RelayContext,
    ) -> Result<(), StoreError> {
        let Some(game_id) = conn.game.clone() else {
            conn.send(ServerMessage::error(ErrorCode::NotInMatch, "No current match")).await;
            return Ok(());
        };

        // An applied move reaches the client through its record feed.
        if let MoveOutcome::Rejected(reason) = context.arbiter.submit_move(&game_id, me, index).await? {
            conn.send(ServerMessage::MoveRejected { reason }).await;
        }
        Ok(())
    }

    /// Handle sync_request.
    async fn handle_sync(conn: &mut Connection, context: &RelayContext) -> Result<(), StoreError> {
        let Some(game_id) = conn.game.clone() else {
            conn.send(ServerMessage::error(ErrorCode::NotInMatch, "No current match")).await;
            return Ok(());
        };

        match context.store.get(&game_id).await? {
            Some(record) => {
                conn.send(ServerMessage::Record {
                    game_id: game_id.to_string(),
                    record: record.to_document(),
                }).await;
            }
            None => {
                conn.unfollow();
                conn.send(ServerMessage::NotFound).await;
            }
        }
        Ok(())
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(store: Arc<dyn RecordStore>, config: RelayConfig) {
        let mut interval = interval(config.cleanup_interval);
        let max_age = chrono::Duration::from_std(config.stale_waiting_after)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        loop {
            interval.tick().await;

            let cutoff = chrono::Utc::now() - max_age;
            match store.remove_stale_waiting(cutoff).await {
                Ok(0) => {}
                Ok(removed) => info!("Expired {} stale waiting matches", removed),
                Err(e) => warn!("Cleanup skipped: {}", e),
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.context.clients.read().await.len()
    }

    /// Get identified participant count.
    pub async fn participant_count(&self) -> usize {
        self.context
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.participant_id.is_some())
            .count()
    }

    /// Get stored record count.
    pub async fn record_count(&self) -> Result<usize, RelayError> {
        Ok(self.context.store.count().await?)
    }

    /// Time since the least recently active client sent anything.
    pub async fn longest_idle(&self) -> Option<Duration> {
        let now = Instant::now();
        self.context
            .clients
            .read()
            .await
            .values()
            .map(|c| now.duration_since(c.last_activity))
            .max()
    }
}

/// Client-facing message for a store failure.
fn store_error_message(e: &StoreError) -> ServerMessage {
    match e {
        StoreError::Unavailable(_) => ServerMessage::error(ErrorCode::StoreUnavailable, e.to_string()),
        StoreError::NotFound(_) => ServerMessage::NotFound,
        StoreError::Corrupt { .. } | StoreError::InvalidWrite(_) => {
            ServerMessage::error(ErrorCode::InternalError, e.to_string())
        }
    }
}
