//! The long-lived, per-group WebSocket event channel.
//!
//! One [`SyncChannel`] exists per group membership, with an owned lifecycle:
//! `connect` spawns the manager task, `close` tears it down. All outbound
//! writes go through a single mutex-guarded sink, so `broadcast` and the
//! heartbeat never interleave partial frames. Inbound membership and
//! location events are applied to the shared [`GroupState`] directly; entity
//! events are re-checked against the privacy rule and fanned out to
//! subscribers.
//!
//! Reconnection policy: a close the user did not ask for schedules exactly
//! one pending reconnect attempt after a fixed delay, except for the
//! policy-rejection close codes 4001 and 4003, which are terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::error::SyncError;
use super::protocol::{build_ws_url, EventType, SyncEvent};
use crate::models::Position;
use crate::store::GroupState;

/// Heartbeat period while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Fixed delay before the single pending reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Close code for a rejected token.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;
/// Close code for a valid token without access to the group.
pub const CLOSE_FORBIDDEN: u16 = 4003;

const EVENT_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection lifecycle, observable through [`SyncChannel::state_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the delay before the next connect attempt.
    Reconnecting,
    /// Terminal: user close or policy rejection.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Inbound traffic after dispatch, for UI and session consumers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A `geo.*` event that passed the inbound privacy re-check.
    Entity(SyncEvent),
    MemberJoined {
        user_id: String,
        active_members: Vec<String>,
    },
    MemberLeft {
        user_id: String,
        active_members: Vec<String>,
    },
    LocationUpdate {
        user_id: String,
        position: Position,
    },
    /// Server-reported error; the connection stays up.
    ServerError { message: String },
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub server_url: String,
    pub group_id: String,
    pub user_id: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(
        server_url: impl Into<String>,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            group_id: group_id.into(),
            user_id: user_id.into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

struct ChannelShared {
    config: ChannelConfig,
    sink: Mutex<Option<WsSink>>,
    user_closed: AtomicBool,
    close_notify: Notify,
    events: broadcast::Sender<ChannelEvent>,
    state_tx: watch::Sender<ConnectionState>,
    group: Arc<GroupState>,
}

/// Why a connection ended, seen from the manager loop.
enum Disconnect {
    User,
    Rejected(u16),
    Network(String),
}

/// Handle to the per-group event channel. Cheap to clone; all clones drive
/// the same connection.
#[derive(Clone)]
pub struct SyncChannel {
    shared: Arc<ChannelShared>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SyncChannel {
    /// Spawns the connection manager and returns immediately; progress is
    /// observable on [`state_stream`](Self::state_stream).
    pub fn connect(config: ChannelConfig, group: Arc<GroupState>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let shared = Arc::new(ChannelShared {
            config,
            sink: Mutex::new(None),
            user_closed: AtomicBool::new(false),
            close_notify: Notify::new(),
            events,
            state_tx,
            group,
        });

        tokio::spawn(run_manager(Arc::clone(&shared)));

        Self { shared, state_rx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn user_id(&self) -> &str {
        &self.shared.config.user_id
    }

    pub fn group_id(&self) -> &str {
        &self.shared.config.group_id
    }

    /// Publishes an entity event to the group.
    ///
    /// Rejects synchronously, before anything is queued or written, when the
    /// entity carries a privacy-excluded `entity_type`. That rejection is a
    /// policy error on the caller's side and is never retried internally.
    pub async fn broadcast(
        &self,
        event_type: EventType,
        entity: serde_json::Value,
        entity_id: impl Into<String>,
    ) -> Result<(), SyncError> {
        let event = SyncEvent::new(event_type)
            .with_user(self.shared.config.user_id.clone())
            .with_entity(entity)
            .with_entity_id(entity_id);
        event.check_privacy()?;
        self.send_event(event).await
    }

    /// Publishes the local member's position.
    pub async fn send_location(&self, position: Position) -> Result<(), SyncError> {
        let event = SyncEvent::location_update(self.shared.config.user_id.clone(), position);
        self.send_event(event).await
    }

    async fn send_event(&self, event: SyncEvent) -> Result<(), SyncError> {
        if self.shared.user_closed.load(Ordering::SeqCst) {
            return Err(SyncError::ChannelClosed);
        }
        let raw = event.encode()?;
        let mut guard = self.shared.sink.lock().await;
        match guard.as_mut() {
            Some(sink) => sink
                .send(Message::Text(raw.into()))
                .await
                .map_err(|e| SyncError::WebSocketError(e.to_string())),
            None => Err(SyncError::ChannelClosed),
        }
    }

    /// Closes the channel for good: sends a normal close (code 1000) when
    /// connected, cancels any pending reconnect, and waits for the manager
    /// to reach the terminal state.
    pub async fn close(&self) {
        self.shared.user_closed.store(true, Ordering::SeqCst);
        self.shared.close_notify.notify_one();
        {
            let mut guard = self.shared.sink.lock().await;
            if let Some(sink) = guard.as_mut() {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client closed".into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
            }
        }
        self.closed().await;
    }

    /// Resolves once the channel reaches its terminal state.
    pub async fn closed(&self) {
        let mut state_rx = self.state_rx.clone();
        loop {
            if *state_rx.borrow() == ConnectionState::Closed {
                return;
            }
            if state_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn run_manager(shared: Arc<ChannelShared>) {
    loop {
        if shared.user_closed.load(Ordering::SeqCst) {
            break;
        }
        set_state(&shared, ConnectionState::Connecting);

        let url = build_ws_url(
            &shared.config.server_url,
            &shared.config.group_id,
            &shared.config.user_id,
        );

        let connected = tokio::select! {
            result = connect_async(&url) => result,
            _ = shared.close_notify.notified() => break,
        };

        match connected {
            Ok((ws, _)) if shared.user_closed.load(Ordering::SeqCst) => {
                // Closed while the handshake was in flight.
                let (mut sink, _) = ws.split();
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            Ok((ws, _)) => {
                info!(
                    group_id = %shared.config.group_id,
                    user_id = %shared.config.user_id,
                    "sync channel connected"
                );
                let (sink, source) = ws.split();
                *shared.sink.lock().await = Some(sink);
                set_state(&shared, ConnectionState::Connected);

                let disconnect = read_connection(&shared, source).await;
                *shared.sink.lock().await = None;

                if shared.user_closed.load(Ordering::SeqCst) {
                    break;
                }
                match disconnect {
                    Disconnect::User => break,
                    Disconnect::Rejected(code) => {
                        warn!(code, "sync channel rejected by server, not reconnecting");
                        break;
                    }
                    Disconnect::Network(reason) => {
                        warn!(reason = %reason, "sync channel lost");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "sync channel connect failed");
            }
        }

        // Exactly one pending reconnect: this task is the only scheduler,
        // and it sleeps through a single delay before the next attempt.
        set_state(&shared, ConnectionState::Reconnecting);
        debug!(
            delay_ms = shared.config.reconnect_delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
            _ = shared.close_notify.notified() => break,
        }
    }

    set_state(&shared, ConnectionState::Closed);
    debug!(group_id = %shared.config.group_id, "sync channel manager stopped");
}

async fn read_connection(shared: &ChannelShared, mut source: WsSource) -> Disconnect {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + shared.config.heartbeat_interval,
        shared.config.heartbeat_interval,
    );

    loop {
        tokio::select! {
            message = source.next() => match message {
                Some(Ok(Message::Text(raw))) => handle_inbound(shared, &raw).await,
                Some(Ok(Message::Ping(data))) => {
                    if let Err(reason) = send_raw(shared, Message::Pong(data)).await {
                        return Disconnect::Network(reason);
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    debug!("transport pong");
                }
                Some(Ok(Message::Close(frame))) => {
                    if shared.user_closed.load(Ordering::SeqCst) {
                        return Disconnect::User;
                    }
                    let code = frame
                        .as_ref()
                        .map(|f| u16::from(f.code))
                        .unwrap_or(1005);
                    if code == CLOSE_UNAUTHORIZED || code == CLOSE_FORBIDDEN {
                        return Disconnect::Rejected(code);
                    }
                    return Disconnect::Network(format!("server closed with code {}", code));
                }
                Some(Ok(other)) => {
                    debug!(kind = ?other, "ignoring unexpected frame");
                }
                Some(Err(e)) => {
                    if shared.user_closed.load(Ordering::SeqCst) {
                        return Disconnect::User;
                    }
                    return Disconnect::Network(e.to_string());
                }
                None => {
                    if shared.user_closed.load(Ordering::SeqCst) {
                        return Disconnect::User;
                    }
                    return Disconnect::Network("stream ended".to_string());
                }
            },
            _ = heartbeat.tick() => {
                let ping = match SyncEvent::ping().encode() {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, "failed to encode heartbeat");
                        continue;
                    }
                };
                if let Err(reason) = send_raw(shared, Message::Text(ping.into())).await {
                    return Disconnect::Network(reason);
                }
                debug!("heartbeat ping sent");
            }
        }
    }
}

async fn send_raw(shared: &ChannelShared, message: Message) -> Result<(), String> {
    let mut guard = shared.sink.lock().await;
    match guard.as_mut() {
        Some(sink) => sink.send(message).await.map_err(|e| e.to_string()),
        None => Err("sink gone".to_string()),
    }
}

/// Parses and dispatches one inbound text frame. A frame that fails to parse
/// is dropped and logged; the connection stays up.
async fn handle_inbound(shared: &ChannelShared, raw: &str) {
    let event = match SyncEvent::decode(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "dropping malformed sync event");
            return;
        }
    };

    match event.event_type {
        EventType::Pong => {
            debug!("heartbeat pong received");
        }
        EventType::Ping => {
            if let Ok(raw) = SyncEvent::pong().encode() {
                let _ = send_raw(shared, Message::Text(raw.into())).await;
            }
        }
        EventType::LocationUpdate => {
            let (user_id, position) = match (event.user_id, event.location) {
                (Some(user_id), Some(position)) => (user_id, position),
                _ => {
                    debug!("location.update without user or location, dropping");
                    return;
                }
            };
            let applied = {
                let mut positions = shared.group.positions.write().await;
                positions.upsert(&user_id, position.clone())
            };
            if !applied {
                return;
            }
            shared
                .group
                .members
                .write()
                .await
                .update_position(&user_id, position.clone());
            let _ = shared.events.send(ChannelEvent::LocationUpdate { user_id, position });
        }
        EventType::MemberJoined => {
            let Some(user_id) = event.user_id else {
                debug!("member.joined without user, dropping");
                return;
            };
            let active_members = event.active_members.unwrap_or_default();
            {
                let mut members = shared.group.members.write().await;
                members.join(&user_id, &user_id);
                for member_id in &active_members {
                    if !members.contains(member_id) {
                        members.join(member_id, member_id);
                    }
                }
            }
            info!(user_id = %user_id, "member joined group");
            let _ = shared.events.send(ChannelEvent::MemberJoined {
                user_id,
                active_members,
            });
        }
        EventType::MemberLeft => {
            let Some(user_id) = event.user_id else {
                debug!("member.left without user, dropping");
                return;
            };
            let active_members = event.active_members.unwrap_or_default();
            shared.group.members.write().await.leave(&user_id);
            shared.group.positions.write().await.remove(&user_id);
            // A departed owner's zone is destroyed with them.
            shared.group.zones.write().await.clear(&user_id);
            info!(user_id = %user_id, "member left group");
            let _ = shared.events.send(ChannelEvent::MemberLeft {
                user_id,
                active_members,
            });
        }
        EventType::GeoCreated | EventType::GeoUpdated | EventType::GeoDeleted => {
            // The sender must have filtered already; distrust them anyway.
            if let Err(e) = event.check_privacy() {
                warn!(error = %e, "inbound entity violates privacy rule, dropping");
                return;
            }
            let _ = shared.events.send(ChannelEvent::Entity(event));
        }
        EventType::Error => {
            let message = event.message.unwrap_or_else(|| "unknown".to_string());
            warn!(message = %message, "server reported error");
            let _ = shared.events.send(ChannelEvent::ServerError { message });
        }
    }
}

fn set_state(shared: &ChannelShared, state: ConnectionState) {
    let _ = shared.state_tx.send(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config(addr: std::net::SocketAddr) -> ChannelConfig {
        let mut config = ChannelConfig::new(format!("ws://{}", addr), "group-1", "user-1");
        config.heartbeat_interval = Duration::from_millis(100);
        config.reconnect_delay = Duration::from_millis(100);
        config
    }

    async fn bind() -> (TcpListener, std::net::SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<ConnectionState>,
        want: ConnectionState,
    ) {
        timeout(WAIT, async {
            loop {
                if *rx.borrow() == want {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached state {}", want));
    }

    async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap() {
                Message::Text(raw) => return raw.to_string(),
                Message::Ping(data) => {
                    ws.send(Message::Pong(data)).await.unwrap();
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_connects_and_sends_heartbeat_pings() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let raw = next_text(&mut server).await;
        let event = SyncEvent::decode(&raw).unwrap();
        assert_eq!(event.event_type, EventType::Ping);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_broadcast_rejects_private_entity_before_any_write() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();
        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let err = channel
            .broadcast(
                EventType::GeoCreated,
                serde_json::json!({"entity_type": "hotspot", "name": "secret spot"}),
                "h-1",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PrivateEntity(t) if t == "hotspot"));

        // The next frame the server sees is the waypoint, proving the
        // hotspot never reached the wire.
        channel
            .broadcast(
                EventType::GeoCreated,
                serde_json::json!({"entity_type": "waypoint", "name": "stand"}),
                "w-1",
            )
            .await
            .unwrap();

        let raw = next_text(&mut server).await;
        let event = SyncEvent::decode(&raw).unwrap();
        assert_eq!(event.event_type, EventType::GeoCreated);
        assert_eq!(event.entity_type(), Some("waypoint"));
        assert_eq!(event.entity_id.as_deref(), Some("w-1"));

        channel.close().await;
    }

    #[tokio::test]
    async fn test_unauthorized_close_is_terminal() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        server
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(CLOSE_UNAUTHORIZED),
                reason: "bad token".into(),
            })))
            .await
            .unwrap();

        wait_for_state(&mut state, ConnectionState::Closed).await;

        // Well past the reconnect delay: no second connection shows up.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_network_close_schedules_one_reconnect() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();

        // First connection dies abruptly.
        let server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;
        drop(server);

        wait_for_state(&mut state, ConnectionState::Reconnecting).await;

        // The channel comes back on its own after the delay.
        let _server2 = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        channel.close().await;
    }

    #[tokio::test]
    async fn test_server_normal_close_still_reconnects() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;
        server
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "server going away".into(),
            }))
            .await
            .unwrap();

        // 1000 from the server is not a policy rejection; only the user's
        // own close is terminal.
        wait_for_state(&mut state, ConnectionState::Reconnecting).await;
        let _server2 = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        channel.close().await;
    }

    #[tokio::test]
    async fn test_user_close_sends_1000_and_suppresses_reconnect() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let close_task = tokio::spawn({
            let channel = channel.clone();
            async move { channel.close().await }
        });

        // The server observes a normal close frame.
        let frame = loop {
            match timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap() {
                Message::Close(frame) => break frame,
                _ => continue,
            }
        };
        assert_eq!(u16::from(frame.unwrap().code), 1000);

        close_task.await.unwrap();
        assert_eq!(channel.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let second = timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_inbound_location_applies_stale_discard() {
        let (listener, addr) = bind().await;
        let group = Arc::new(GroupState::new());
        let channel = SyncChannel::connect(test_config(addr), Arc::clone(&group));
        let mut state = channel.state_stream();
        let mut events = channel.subscribe();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let now = Utc::now();
        let fresh = Position::at(46.81, -71.20, now);
        let event = SyncEvent::location_update("user-2", fresh.clone());
        server
            .send(Message::Text(event.encode().unwrap().into()))
            .await
            .unwrap();

        // Wait until the update lands.
        let received = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(
            received,
            ChannelEvent::LocationUpdate { ref user_id, .. } if user_id == "user-2"
        ));
        assert_eq!(
            group.positions.read().await.latest("user-2").unwrap().lat,
            46.81
        );

        // An older position for the same member is discarded.
        let stale = Position::at(0.0, 0.0, now - ChronoDuration::seconds(60));
        let event = SyncEvent::location_update("user-2", stale);
        server
            .send(Message::Text(event.encode().unwrap().into()))
            .await
            .unwrap();

        // Use a later valid event as the synchronization point.
        let newer = Position::at(46.82, -71.21, now + ChronoDuration::seconds(1));
        let event = SyncEvent::location_update("user-2", newer);
        server
            .send(Message::Text(event.encode().unwrap().into()))
            .await
            .unwrap();

        let received = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        match received {
            ChannelEvent::LocationUpdate { position, .. } => assert_eq!(position.lat, 46.82),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(
            group.positions.read().await.latest("user-2").unwrap().lat,
            46.82
        );

        channel.close().await;
    }

    #[tokio::test]
    async fn test_inbound_membership_updates_roster_and_clears_zone() {
        let (listener, addr) = bind().await;
        let group = Arc::new(GroupState::new());
        let channel = SyncChannel::connect(test_config(addr), Arc::clone(&group));
        let mut state = channel.state_stream();
        let mut events = channel.subscribe();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let mut joined = SyncEvent::new(EventType::MemberJoined).with_user("user-2");
        joined.active_members = Some(vec!["user-1".to_string(), "user-2".to_string()]);
        server
            .send(Message::Text(joined.encode().unwrap().into()))
            .await
            .unwrap();

        timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(group.members.read().await.contains("user-2"));

        // Give the departing member a zone; it must not survive them.
        use crate::models::{ZoneKind, ZoneParams};
        group
            .zones
            .write()
            .await
            .set(
                "user-2",
                ZoneParams::new(Position::new(46.81, -71.20), 90.0, 60.0, 300.0)
                    .with_kind(ZoneKind::Active),
            )
            .unwrap();

        let left = SyncEvent::new(EventType::MemberLeft).with_user("user-2");
        server
            .send(Message::Text(left.encode().unwrap().into()))
            .await
            .unwrap();

        timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(!group.members.read().await.contains("user-2"));
        assert!(group.zones.read().await.by_owner("user-2").is_none());

        channel.close().await;
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_connection_survives() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();
        let mut events = channel.subscribe();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        server
            .send(Message::Text("{definitely not json".into()))
            .await
            .unwrap();

        // A valid event afterwards still arrives: the bad frame was dropped
        // without closing anything.
        let event = SyncEvent::location_update("user-2", Position::new(46.0, -71.0));
        server
            .send(Message::Text(event.encode().unwrap().into()))
            .await
            .unwrap();

        let received = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert!(matches!(received, ChannelEvent::LocationUpdate { .. }));
        assert_eq!(channel.state(), ConnectionState::Connected);

        channel.close().await;
    }

    #[tokio::test]
    async fn test_inbound_private_entity_not_forwarded() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();
        let mut events = channel.subscribe();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let private = SyncEvent::new(EventType::GeoCreated)
            .with_user("user-2")
            .with_entity(serde_json::json!({"entity_type": "corridor"}))
            .with_entity_id("c-1");
        server
            .send(Message::Text(private.encode().unwrap().into()))
            .await
            .unwrap();

        let shared = SyncEvent::new(EventType::GeoCreated)
            .with_user("user-2")
            .with_entity(serde_json::json!({"entity_type": "waypoint"}))
            .with_entity_id("w-1");
        server
            .send(Message::Text(shared.encode().unwrap().into()))
            .await
            .unwrap();

        // Only the waypoint comes through.
        let received = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        match received {
            ChannelEvent::Entity(event) => {
                assert_eq!(event.entity_type(), Some("waypoint"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        channel.close().await;
    }

    #[tokio::test]
    async fn test_server_error_surfaced_without_closing() {
        let (listener, addr) = bind().await;
        let channel = SyncChannel::connect(test_config(addr), Arc::new(GroupState::new()));
        let mut state = channel.state_stream();
        let mut events = channel.subscribe();

        let mut server = accept_ws(&listener).await;
        wait_for_state(&mut state, ConnectionState::Connected).await;

        let error = SyncEvent::new(EventType::Error).with_message("rate limited");
        server
            .send(Message::Text(error.encode().unwrap().into()))
            .await
            .unwrap();

        let received = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        match received {
            ChannelEvent::ServerError { message } => assert_eq!(message, "rate limited"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(channel.state(), ConnectionState::Connected);

        channel.close().await;
    }
}
