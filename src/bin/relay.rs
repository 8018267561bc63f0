//! HuntLink Relay
//!
//! A development relay for HuntLink groups: fans WebSocket events out to
//! the members of a group and answers the tracking REST surface from
//! memory. Nothing is persisted; restarting clears every group.
//!
//! # Configuration
//!
//! Environment variables:
//! - `HUNTLINK_RELAY_PORT`: Port to listen on (default: 8080)
//! - `HUNTLINK_RELAY_HISTORY_LIMIT`: Positions kept per member (default: 500)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check
//! - `GET /ws?token=user:<id>&group_id=<group>`: Group event channel
//! - `POST /tracking/session/start/{user_id}`: Open a tracking session
//! - `POST /tracking/session/stop/{user_id}?group_id=`: Close one
//! - `POST /tracking/position/{user_id}?group_id=`: Push a position fix
//! - `GET /tracking/group/{group_id}/positions`: Latest fix per member
//! - `GET /tracking/history/{user_id}?group_id=&hours=`: Recent trail
//! - `POST /chat/{user_id}?group_id=`: Deliver a message to the group
//! - `GET /groups/{group_id}/chat`: Stored messages (debugging aid)

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hunt_link_core::sync::{EventType, SyncEvent, CLOSE_UNAUTHORIZED};
use hunt_link_core::tracking::MemberPosition;
use hunt_link_core::Position;

// ============================================================================
// Configuration
// ============================================================================

/// Relay configuration
#[derive(Debug, Clone)]
struct RelayConfig {
    /// Port to listen on
    port: u16,
    /// Positions kept per member before the trail is trimmed
    history_limit: usize,
}

impl RelayConfig {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("HUNTLINK_RELAY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let history_limit = std::env::var("HUNTLINK_RELAY_HISTORY_LIMIT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(500);

        Self {
            port,
            history_limit,
        }
    }
}

// ============================================================================
// Group state
// ============================================================================

/// Buffered events per group channel.
const EVENT_BUFFER: usize = 64;

/// One event on a group's channel, tagged with its origin so the sender's
/// own traffic is not echoed back.
#[derive(Debug, Clone)]
struct Outbound {
    origin: Option<String>,
    raw: String,
}

/// A chat message kept for the group.
#[derive(Debug, Clone, Serialize)]
struct ChatRecord {
    user_id: String,
    message: String,
    timestamp: DateTime<Utc>,
}

/// Live state for one hunting group.
struct GroupRoom {
    events: broadcast::Sender<Outbound>,
    /// Members with an open channel connection.
    members: RwLock<BTreeSet<String>>,
    /// Latest fix per member, dropped when the member disconnects.
    positions: RwLock<HashMap<String, Position>>,
    /// Bounded trail per member, kept across disconnects.
    history: RwLock<HashMap<String, VecDeque<Position>>>,
    chats: RwLock<Vec<ChatRecord>>,
}

impl GroupRoom {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            events,
            members: RwLock::new(BTreeSet::new()),
            positions: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            chats: RwLock::new(Vec::new()),
        }
    }

    /// Queues an event for every connected member except `origin`.
    fn send(&self, origin: Option<&str>, event: &SyncEvent) {
        match event.encode() {
            Ok(raw) => {
                // No subscribers is fine.
                let _ = self.events.send(Outbound {
                    origin: origin.map(String::from),
                    raw,
                });
            }
            Err(e) => warn!(error = %e, "failed to encode relay event"),
        }
    }
}

/// All groups the relay has seen since it started.
#[derive(Default)]
struct Rooms {
    groups: RwLock<HashMap<String, Arc<GroupRoom>>>,
}

impl Rooms {
    async fn room(&self, group_id: &str) -> Arc<GroupRoom> {
        if let Some(room) = self.groups.read().await.get(group_id) {
            return room.clone();
        }
        let mut groups = self.groups.write().await;
        groups
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(GroupRoom::new()))
            .clone()
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    rooms: Arc<Rooms>,
    history_limit: usize,
}

async fn store_position(state: &AppState, room: &GroupRoom, user_id: &str, position: Position) {
    room.positions
        .write()
        .await
        .insert(user_id.to_string(), position.clone());
    let mut history = room.history.write().await;
    let trail = history.entry(user_id.to_string()).or_default();
    trail.push_back(position);
    while trail.len() > state.history_limit {
        trail.pop_front();
    }
}

// ============================================================================
// WebSocket channel
// ============================================================================

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(default)]
    token: String,
    #[serde(default)]
    group_id: String,
}

/// Tokens are `user:<id>`. Anything else is rejected with a terminal close
/// so clients stop reconnecting.
fn parse_token(token: &str) -> Option<&str> {
    let user = token.strip_prefix("user:")?;
    if user.is_empty() {
        None
    } else {
        Some(user)
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn handle_socket(mut socket: WebSocket, params: WsParams, state: AppState) {
    let user_id = match parse_token(&params.token) {
        Some(user) if !params.group_id.is_empty() => user.to_string(),
        _ => {
            warn!(token = %params.token, "rejecting connection with bad token");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNAUTHORIZED,
                    reason: "unauthorized".into(),
                })))
                .await;
            return;
        }
    };
    let group_id = params.group_id;

    let room = state.rooms.room(&group_id).await;
    let mut events = room.events.subscribe();

    // Join the roster and tell the group. The joining member gets the same
    // event; the roster snapshot on it seeds their member list.
    let roster = {
        let mut members = room.members.write().await;
        members.insert(user_id.clone());
        members.iter().cloned().collect::<Vec<_>>()
    };
    info!(user = %user_id, group = %group_id, "member connected");
    let mut joined = SyncEvent::new(EventType::MemberJoined).with_user(user_id.clone());
    joined.active_members = Some(roster);
    room.send(None, &joined);

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) =
                        handle_client_event(&state, &room, &user_id, text.as_str()).await
                    {
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Protocol-level pings are answered by the socket layer.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(user = %user_id, error = %e, "socket error");
                    break;
                }
            },
            outbound = events.recv() => match outbound {
                Ok(out) => {
                    if out.origin.as_deref() == Some(user_id.as_str()) {
                        continue;
                    }
                    if socket.send(Message::Text(out.raw.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(user = %user_id, missed, "member fell behind the group channel");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // Leave: drop the roster entry and the live position, then announce.
    let roster = {
        let mut members = room.members.write().await;
        members.remove(&user_id);
        members.iter().cloned().collect::<Vec<_>>()
    };
    room.positions.write().await.remove(&user_id);
    info!(user = %user_id, group = %group_id, "member disconnected");
    let mut left = SyncEvent::new(EventType::MemberLeft).with_user(user_id.clone());
    left.active_members = Some(roster);
    room.send(None, &left);
}

/// Applies one client event. Returns a direct reply for the sender, if any.
async fn handle_client_event(
    state: &AppState,
    room: &GroupRoom,
    user_id: &str,
    raw: &str,
) -> Option<String> {
    let event = match SyncEvent::decode(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!(user = %user_id, error = %e, "malformed event");
            let reply = SyncEvent::new(EventType::Error).with_message("malformed event");
            return reply.encode().ok();
        }
    };

    match event.event_type {
        EventType::Ping => SyncEvent::pong().encode().ok(),
        EventType::LocationUpdate => {
            if let Some(position) = event.location.clone() {
                store_position(state, room, user_id, position).await;
            }
            // Clients stamp their own id; the relay does not trust it.
            let mut event = event;
            event.user_id = Some(user_id.to_string());
            room.send(Some(user_id), &event);
            None
        }
        EventType::GeoCreated | EventType::GeoUpdated | EventType::GeoDeleted => {
            let mut event = event;
            event.user_id = Some(user_id.to_string());
            room.send(Some(user_id), &event);
            None
        }
        // The relay owns membership events.
        EventType::MemberJoined | EventType::MemberLeft => {
            debug!(user = %user_id, event = %event.event_type, "dropping client membership event");
            None
        }
        EventType::Pong | EventType::Error => None,
    }
}

// ============================================================================
// Tracking endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct GroupQuery {
    group_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionStartBody {
    group_id: String,
    #[serde(default)]
    settings: serde_json::Value,
}

async fn start_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<SessionStartBody>,
) -> Json<serde_json::Value> {
    debug!(
        user = %user_id,
        group = %body.group_id,
        settings = %body.settings,
        "tracking session started"
    );
    // Rooms outlive REST-only members.
    state.rooms.room(&body.group_id).await;
    Json(json!({ "status": "started" }))
}

async fn stop_session(
    Path(user_id): Path<String>,
    Query(query): Query<GroupQuery>,
) -> Json<serde_json::Value> {
    debug!(user = %user_id, group = %query.group_id, "tracking session stopped");
    Json(json!({ "status": "stopped" }))
}

async fn push_position(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<GroupQuery>,
    Json(position): Json<Position>,
) -> Json<serde_json::Value> {
    let room = state.rooms.room(&query.group_id).await;
    store_position(&state, &room, &user_id, position.clone()).await;
    // Members hear REST pushes the same way they hear live fixes.
    room.send(
        Some(&user_id),
        &SyncEvent::location_update(user_id.clone(), position),
    );
    Json(json!({ "status": "ok" }))
}

async fn group_positions(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Json<Vec<MemberPosition>> {
    let room = state.rooms.room(&group_id).await;
    let positions = room.positions.read().await;
    let mut list: Vec<MemberPosition> = positions
        .iter()
        .map(|(user_id, position)| MemberPosition {
            user_id: user_id.clone(),
            position: position.clone(),
        })
        .collect();
    list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    Json(list)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    group_id: String,
    #[serde(default = "default_history_hours")]
    hours: u32,
}

fn default_history_hours() -> u32 {
    24
}

async fn position_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Position>> {
    let cutoff = Utc::now() - chrono::Duration::hours(i64::from(query.hours));
    let room = state.rooms.room(&query.group_id).await;
    let history = room.history.read().await;
    let trail = history
        .get(&user_id)
        .map(|trail| {
            trail
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Json(trail)
}

// ============================================================================
// Chat endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: String,
}

async fn post_chat(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<GroupQuery>,
    Json(body): Json<ChatBody>,
) -> Json<serde_json::Value> {
    let room = state.rooms.room(&query.group_id).await;
    room.chats.write().await.push(ChatRecord {
        user_id: user_id.clone(),
        message: body.message,
        timestamp: Utc::now(),
    });
    info!(user = %user_id, group = %query.group_id, "chat message stored");
    Json(json!({ "status": "ok" }))
}

async fn group_chat(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Json<Vec<ChatRecord>> {
    let room = state.rooms.room(&group_id).await;
    let chats = room.chats.read().await.clone();
    Json(chats)
}

// ============================================================================
// Health / router
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/tracking/session/start/{user_id}", post(start_session))
        .route("/tracking/session/stop/{user_id}", post(stop_session))
        .route("/tracking/position/{user_id}", post(push_position))
        .route("/tracking/group/{group_id}/positions", get(group_positions))
        .route("/tracking/history/{user_id}", get(position_history))
        .route("/chat/{user_id}", post(post_chat))
        .route("/groups/{group_id}/chat", get(group_chat))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huntlink_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = RelayConfig::from_env();

    let state = AppState {
        rooms: Arc::new(Rooms::default()),
        history_limit: config.history_limit,
    };

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting relay on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app(state)).await.unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite;

    type WsClient = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    const WAIT: Duration = Duration::from_secs(5);

    async fn spawn_relay() -> SocketAddr {
        let state = AppState {
            rooms: Arc::new(Rooms::default()),
            history_limit: 10,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = app(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr, user: &str, group: &str) -> WsClient {
        let url = format!(
            "ws://{}/ws?token=user%3A{}&group_id={}",
            addr, user, group
        );
        let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        stream
    }

    /// Reads frames until a decodable event arrives.
    async fn next_event(client: &mut WsClient) -> SyncEvent {
        loop {
            let frame = timeout(WAIT, client.next())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .expect("socket error");
            if let tungstenite::Message::Text(text) = frame {
                return SyncEvent::decode(&text).expect("undecodable event");
            }
        }
    }

    async fn expect_quiet(client: &mut WsClient) {
        let outcome = timeout(Duration::from_millis(300), client.next()).await;
        assert!(outcome.is_err(), "expected no frame, got {:?}", outcome);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let addr = spawn_relay().await;
        let body: serde_json::Value = reqwest::get(format!("http://{}/health", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_bad_token_closes_4001() {
        let addr = spawn_relay().await;
        let url = format!("ws://{}/ws?token=bogus&group_id=g", addr);
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .expect("socket error");
        match frame {
            tungstenite::Message::Close(Some(close)) => {
                assert_eq!(u16::from(close.code), CLOSE_UNAUTHORIZED);
            }
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_join_events_carry_roster() {
        let addr = spawn_relay().await;

        let mut alice = connect(addr, "alice", "elk-camp").await;
        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::MemberJoined);
        assert_eq!(event.user_id.as_deref(), Some("alice"));
        assert_eq!(event.active_members, Some(vec!["alice".to_string()]));

        let mut bob = connect(addr, "bob", "elk-camp").await;
        let event = next_event(&mut bob).await;
        assert_eq!(event.user_id.as_deref(), Some("bob"));
        assert_eq!(
            event.active_members,
            Some(vec!["alice".to_string(), "bob".to_string()])
        );

        // Alice hears about bob too.
        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::MemberJoined);
        assert_eq!(event.user_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_location_fanout_suppresses_echo() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr, "alice", "g").await;
        let mut bob = connect(addr, "bob", "g").await;
        next_event(&mut alice).await; // own join
        next_event(&mut alice).await; // bob's join
        next_event(&mut bob).await; // own join

        let fix = SyncEvent::location_update("bob", Position::new(46.81, -71.20));
        bob.send(tungstenite::Message::Text(fix.encode().unwrap().into()))
            .await
            .unwrap();

        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::LocationUpdate);
        assert_eq!(event.user_id.as_deref(), Some("bob"));
        let location = event.location.expect("location payload");
        assert_eq!(location.lat, 46.81);

        // The sender never hears its own fix back.
        expect_quiet(&mut bob).await;

        // The REST surface serves what the channel stored.
        let positions: Vec<MemberPosition> =
            reqwest::get(format!("http://{}/tracking/group/g/positions", addr))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].user_id, "bob");
    }

    #[tokio::test]
    async fn test_rest_position_push_reaches_channel() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr, "alice", "g").await;
        next_event(&mut alice).await; // own join

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/tracking/position/carol?group_id=g", addr))
            .json(&Position::new(46.9, -71.3))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::LocationUpdate);
        assert_eq!(event.user_id.as_deref(), Some("carol"));

        let trail: Vec<Position> = reqwest::get(format!(
            "http://{}/tracking/history/carol?group_id=g&hours=1",
            addr
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].lat, 46.9);
    }

    #[tokio::test]
    async fn test_zone_events_forwarded_not_echoed() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr, "alice", "g").await;
        let mut bob = connect(addr, "bob", "g").await;
        next_event(&mut alice).await;
        next_event(&mut alice).await;
        next_event(&mut bob).await;

        let declared = SyncEvent::new(EventType::GeoCreated)
            .with_user("alice")
            .with_entity(json!({ "entity_type": "shooting_zone", "range_m": 300.0 }))
            .with_entity_id("zone-1");
        alice
            .send(tungstenite::Message::Text(
                declared.encode().unwrap().into(),
            ))
            .await
            .unwrap();

        let event = next_event(&mut bob).await;
        assert_eq!(event.event_type, EventType::GeoCreated);
        assert_eq!(event.entity_id.as_deref(), Some("zone-1"));
        expect_quiet(&mut alice).await;
    }

    #[tokio::test]
    async fn test_member_left_on_disconnect() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr, "alice", "g").await;
        let mut bob = connect(addr, "bob", "g").await;
        next_event(&mut alice).await;
        next_event(&mut alice).await;
        next_event(&mut bob).await;

        let fix = SyncEvent::location_update("bob", Position::new(46.81, -71.20));
        bob.send(tungstenite::Message::Text(fix.encode().unwrap().into()))
            .await
            .unwrap();
        next_event(&mut alice).await; // bob's fix

        bob.close(None).await.unwrap();

        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::MemberLeft);
        assert_eq!(event.user_id.as_deref(), Some("bob"));
        assert_eq!(event.active_members, Some(vec!["alice".to_string()]));

        // The live position is gone with the member, the trail survives.
        let positions: Vec<MemberPosition> =
            reqwest::get(format!("http://{}/tracking/group/g/positions", addr))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert!(positions.iter().all(|p| p.user_id != "bob"));

        let trail: Vec<Position> = reqwest::get(format!(
            "http://{}/tracking/history/bob?group_id=g&hours=1",
            addr
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        assert_eq!(trail.len(), 1);
    }

    #[tokio::test]
    async fn test_app_ping_answered_directly() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr, "alice", "g").await;
        next_event(&mut alice).await; // own join

        alice
            .send(tungstenite::Message::Text(
                SyncEvent::ping().encode().unwrap().into(),
            ))
            .await
            .unwrap();
        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::Pong);
    }

    #[tokio::test]
    async fn test_malformed_event_gets_error_reply() {
        let addr = spawn_relay().await;
        let mut alice = connect(addr, "alice", "g").await;
        next_event(&mut alice).await; // own join

        alice
            .send(tungstenite::Message::Text("not json".into()))
            .await
            .unwrap();
        let event = next_event(&mut alice).await;
        assert_eq!(event.event_type, EventType::Error);
        assert_eq!(event.message.as_deref(), Some("malformed event"));
    }

    #[tokio::test]
    async fn test_chat_stored_for_group() {
        let addr = spawn_relay().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/chat/alice?group_id=g", addr))
            .json(&json!({ "message": "meet at the ridge" }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());

        let chats: serde_json::Value = reqwest::get(format!("http://{}/groups/g/chat", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(chats[0]["user_id"], "alice");
        assert_eq!(chats[0]["message"], "meet at the ridge");
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("user:alice"), Some("alice"));
        assert_eq!(parse_token("user:"), None);
        assert_eq!(parse_token("apikey:xyz"), None);
        assert_eq!(parse_token(""), None);
    }

    #[test]
    fn test_history_trim() {
        // Exercised through store_position's bound.
        let state = AppState {
            rooms: Arc::new(Rooms::default()),
            history_limit: 3,
        };
        let room = GroupRoom::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            for i in 0..5 {
                store_position(&state, &room, "alice", Position::new(46.0 + f64::from(i), -71.0))
                    .await;
            }
            let history = room.history.read().await;
            let trail = history.get("alice").unwrap();
            assert_eq!(trail.len(), 3);
            assert_eq!(trail.front().unwrap().lat, 48.0);
        });
    }
}
