//! Group session: one member's live participation in one group.
//!
//! Wires the stores, the safety monitor, the alert aggregator, the sync
//! channel and the position tracker together, and fans everything a
//! consumer cares about out on a single typed event stream. Construct one
//! session per group membership and tear it down with [`GroupSession::stop`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{
    AlertAggregator, AlertEffects, AlertEvent, AlertSettings, CooldownConfig,
};
use crate::models::{Alert, Position, ShootingZone, ZoneError, ZoneKind, ZoneParams};
use crate::safety::{MonitorConfig, SafetyMonitor, SafetyReport};
use crate::store::GroupState;
use crate::sync::{
    ChannelConfig, ChannelEvent, ConnectionState, EventType, SyncChannel, SyncEvent,
};
use crate::tracking::{
    location_channel, LocationFeed, PositionTracker, TrackingApi, TrackingSettings,
};

/// Entity type under which shooting zones travel in `geo.*` events.
pub const SHOOTING_ZONE_ENTITY: &str = "shooting_zone";

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_url: String,
    pub group_id: String,
    pub user_id: String,
    pub display_name: String,
    pub tracking: TrackingSettings,
    pub monitor: MonitorConfig,
    pub alert_settings: AlertSettings,
    pub cooldowns: CooldownConfig,
}

impl SessionConfig {
    pub fn new(
        server_url: impl Into<String>,
        group_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            server_url: server_url.into(),
            group_id: group_id.into(),
            display_name: user_id.clone(),
            user_id,
            tracking: TrackingSettings::default(),
            monitor: MonitorConfig::default(),
            alert_settings: AlertSettings::default(),
            cooldowns: CooldownConfig::default(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}

/// What the session publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new alert, with the sound/vibration effects already resolved.
    Alert {
        alert: Alert,
        effects: AlertEffects,
    },
    MemberJoined {
        member_id: String,
    },
    MemberLeft {
        member_id: String,
    },
    /// A peer moved; the store is already updated.
    Position {
        member_id: String,
        position: Position,
    },
    /// A peer declared or changed a zone; the registry is already updated.
    ZoneUpdated {
        zone: ShootingZone,
    },
    ZoneCleared {
        owner_id: String,
    },
    /// A `geo.*` event for an entity kind the session does not interpret.
    Entity(SyncEvent),
    ServerError {
        message: String,
    },
}

/// Delivery state of an outgoing chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// Kept client-side after a failed send; retried only on request.
    Pending,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub status: ChatStatus,
}

/// A running group membership.
pub struct GroupSession {
    state: Arc<GroupState>,
    alerts: Arc<AlertAggregator>,
    channel: SyncChannel,
    api: TrackingApi,
    monitor: SafetyMonitor,
    tracker: Option<PositionTracker>,
    tracking: TrackingSettings,
    outbox: Mutex<Vec<ChatMessage>>,
    events: broadcast::Sender<SessionEvent>,
    shutdown: Arc<Notify>,
    dispatch: JoinHandle<()>,
}

impl GroupSession {
    /// Starts the session: joins the local roster, connects the channel,
    /// spawns the safety monitor and the dispatch task. When the tracking
    /// settings say `auto_start`, also starts the tracker and returns the
    /// feed to push device fixes into; otherwise call
    /// [`start_tracking`](Self::start_tracking) later.
    pub async fn start(config: SessionConfig) -> (Self, Option<LocationFeed>) {
        let SessionConfig {
            server_url,
            group_id,
            user_id,
            display_name,
            tracking,
            monitor,
            alert_settings,
            cooldowns,
        } = config;

        let state = Arc::new(GroupState::new());
        state.members.write().await.join(&user_id, &display_name);

        let alerts = Arc::new(AlertAggregator::new(alert_settings, cooldowns));
        let api = TrackingApi::new(server_url.clone());
        let channel = SyncChannel::connect(
            ChannelConfig::new(server_url, group_id, user_id.clone()),
            Arc::clone(&state),
        );
        let monitor = SafetyMonitor::spawn(
            user_id.clone(),
            Arc::clone(&state),
            Arc::clone(&alerts),
            monitor,
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = Arc::new(Notify::new());
        let dispatch = tokio::spawn(run_dispatch(
            Arc::clone(&state),
            events.clone(),
            channel.subscribe(),
            alerts.subscribe(),
            Arc::clone(&shutdown),
        ));

        info!(user_id = %user_id, group_id = %channel.group_id(), "Group session started");

        let mut session = Self {
            state,
            alerts,
            channel,
            api,
            monitor,
            tracker: None,
            tracking,
            outbox: Mutex::new(Vec::new()),
            events,
            shutdown,
            dispatch,
        };
        let feed = if session.tracking.auto_start {
            session.start_tracking()
        } else {
            None
        };
        (session, feed)
    }

    pub fn user_id(&self) -> &str {
        self.channel.user_id()
    }

    pub fn group_id(&self) -> &str {
        self.channel.group_id()
    }

    /// Shared group state, for read access to positions, zones and roster.
    pub fn group(&self) -> Arc<GroupState> {
        Arc::clone(&self.state)
    }

    pub fn alerts(&self) -> Arc<AlertAggregator> {
        Arc::clone(&self.alerts)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.channel.state_stream()
    }

    pub fn safety_reports(&self) -> watch::Receiver<SafetyReport> {
        self.monitor.reports()
    }

    /// Runs a safety evaluation outside the regular interval.
    pub async fn run_safety_check(&self) {
        self.monitor.run_now().await;
    }

    /// Starts position tracking and returns the feed for device fixes.
    /// Returns `None` when tracking is already running.
    pub fn start_tracking(&mut self) -> Option<LocationFeed> {
        if self.tracker.is_some() {
            return None;
        }
        let (feed, source) = location_channel();
        self.tracker = Some(PositionTracker::spawn(
            Arc::clone(&self.state),
            self.channel.clone(),
            self.api.clone(),
            self.tracking.clone(),
            source,
        ));
        info!("Tracking started");
        Some(feed)
    }

    /// Stops tracking. The feed goes dead, which tells the platform to
    /// release the device location subscription.
    pub async fn stop_tracking(&mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.stop().await;
            info!("Tracking stopped");
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// Declares or replaces the local member's zone and announces it to the
    /// group. A failed announcement leaves the local registry updated and
    /// is logged; peers catch up on the next declaration.
    pub async fn set_zone(&self, params: ZoneParams) -> Result<ShootingZone, ZoneError> {
        let (zone, replaced) = {
            let mut zones = self.state.zones.write().await;
            let replaced = zones.by_owner(self.user_id()).is_some();
            (zones.set(self.user_id(), params)?, replaced)
        };
        let event_type = if replaced {
            EventType::GeoUpdated
        } else {
            EventType::GeoCreated
        };
        if let Err(e) = self
            .channel
            .broadcast(event_type, zone_entity(&zone), zone.id.to_string())
            .await
        {
            warn!(error = %e, "Zone announcement failed, peers will not see the change");
        }
        Ok(zone)
    }

    /// Switches the local zone between active/standby/safe and announces
    /// the change.
    pub async fn set_zone_kind(&self, kind: ZoneKind) -> Option<ShootingZone> {
        let zone = {
            let mut zones = self.state.zones.write().await;
            zones.set_kind(self.user_id(), kind).cloned()
        }?;
        if let Err(e) = self
            .channel
            .broadcast(EventType::GeoUpdated, zone_entity(&zone), zone.id.to_string())
            .await
        {
            warn!(error = %e, "Zone announcement failed, peers will not see the change");
        }
        Some(zone)
    }

    /// Clears the local member's zone and announces the removal.
    pub async fn clear_zone(&self) -> Option<ShootingZone> {
        let zone = self.state.zones.write().await.clear(self.user_id())?;
        let tombstone = serde_json::json!({ "entity_type": SHOOTING_ZONE_ENTITY });
        if let Err(e) = self
            .channel
            .broadcast(EventType::GeoDeleted, tombstone, zone.id.to_string())
            .await
        {
            warn!(error = %e, "Zone removal announcement failed");
        }
        Some(zone)
    }

    pub async fn my_zone(&self) -> Option<ShootingZone> {
        self.state.zones.read().await.by_owner(self.user_id()).cloned()
    }

    /// Sends a chat message. On failure the message stays in the outbox as
    /// pending; nothing retries it automatically.
    pub async fn send_chat(&self, text: impl Into<String>) -> ChatMessage {
        let mut message = ChatMessage {
            id: Uuid::new_v4(),
            text: text.into(),
            sent_at: Utc::now(),
            status: ChatStatus::Pending,
        };
        self.outbox.lock().await.push(message.clone());

        match self
            .api
            .send_chat(self.user_id(), self.group_id(), &message.text)
            .await
        {
            Ok(()) => {
                self.mark_chat_sent(message.id).await;
                message.status = ChatStatus::Sent;
            }
            Err(e) => {
                warn!(error = %e, "Chat send failed, message kept pending");
            }
        }
        message
    }

    /// Snapshot of the chat outbox, oldest first.
    pub async fn chat_outbox(&self) -> Vec<ChatMessage> {
        self.outbox.lock().await.clone()
    }

    /// Attempts every pending chat message once. Returns how many went
    /// through.
    pub async fn retry_pending_chat(&self) -> usize {
        let pending: Vec<ChatMessage> = self
            .outbox
            .lock()
            .await
            .iter()
            .filter(|m| m.status == ChatStatus::Pending)
            .cloned()
            .collect();

        let mut sent = 0;
        for message in pending {
            if self
                .api
                .send_chat(self.user_id(), self.group_id(), &message.text)
                .await
                .is_ok()
            {
                self.mark_chat_sent(message.id).await;
                sent += 1;
            }
        }
        sent
    }

    async fn mark_chat_sent(&self, id: Uuid) {
        let mut outbox = self.outbox.lock().await;
        if let Some(message) = outbox.iter_mut().find(|m| m.id == id) {
            message.status = ChatStatus::Sent;
        }
    }

    /// Tears the session down: stops the tracker (releasing the location
    /// feed), stops the monitor, stops dispatch, then closes the channel
    /// with a normal close so no reconnect is attempted.
    pub async fn stop(mut self) {
        if let Some(tracker) = self.tracker.take() {
            tracker.stop().await;
        }
        self.monitor.stop().await;
        self.shutdown.notify_one();
        let _ = (&mut self.dispatch).await;
        self.channel.close().await;
        info!(group_id = %self.channel.group_id(), "Group session ended");
    }
}

fn zone_entity(zone: &ShootingZone) -> serde_json::Value {
    let mut value = serde_json::to_value(zone).unwrap_or_default();
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "entity_type".to_string(),
            serde_json::Value::String(SHOOTING_ZONE_ENTITY.to_string()),
        );
    }
    value
}

async fn run_dispatch(
    state: Arc<GroupState>,
    events: broadcast::Sender<SessionEvent>,
    mut channel_rx: broadcast::Receiver<ChannelEvent>,
    mut alert_rx: broadcast::Receiver<AlertEvent>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            event = channel_rx.recv() => match event {
                Ok(event) => handle_channel_event(&state, &events, event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Session dispatch lagged behind channel events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = alert_rx.recv() => match event {
                Ok(AlertEvent::Created { alert, effects }) => {
                    let _ = events.send(SessionEvent::Alert { alert, effects });
                }
                Ok(AlertEvent::Cleared { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Session dispatch lagged behind alert events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("Session dispatch stopped");
}

async fn handle_channel_event(
    state: &GroupState,
    events: &broadcast::Sender<SessionEvent>,
    event: ChannelEvent,
) {
    match event {
        ChannelEvent::Entity(ev) => {
            if ev.entity_type() == Some(SHOOTING_ZONE_ENTITY) {
                apply_zone_event(state, events, ev).await;
            } else {
                let _ = events.send(SessionEvent::Entity(ev));
            }
        }
        ChannelEvent::MemberJoined { user_id, .. } => {
            let _ = events.send(SessionEvent::MemberJoined { member_id: user_id });
        }
        ChannelEvent::MemberLeft { user_id, .. } => {
            let _ = events.send(SessionEvent::MemberLeft { member_id: user_id });
        }
        ChannelEvent::LocationUpdate { user_id, position } => {
            let _ = events.send(SessionEvent::Position {
                member_id: user_id,
                position,
            });
        }
        ChannelEvent::ServerError { message } => {
            let _ = events.send(SessionEvent::ServerError { message });
        }
    }
}

/// Applies a zone entity from a peer to the local registry.
async fn apply_zone_event(
    state: &GroupState,
    events: &broadcast::Sender<SessionEvent>,
    ev: SyncEvent,
) {
    match ev.event_type {
        EventType::GeoCreated | EventType::GeoUpdated => {
            let Some(entity) = ev.entity else { return };
            match serde_json::from_value::<ShootingZone>(entity) {
                Ok(zone) => {
                    let applied = state.zones.write().await.apply_remote(zone.clone());
                    if applied {
                        debug!(owner_id = %zone.owner_id, zone_id = %zone.id, "Remote zone applied");
                        let _ = events.send(SessionEvent::ZoneUpdated { zone });
                    }
                }
                Err(e) => warn!(error = %e, "Discarding malformed zone entity"),
            }
        }
        EventType::GeoDeleted => {
            let Some(zone_id) = ev
                .entity_id
                .as_deref()
                .and_then(|raw| Uuid::parse_str(raw).ok())
            else {
                warn!("Zone removal without a usable entity id");
                return;
            };
            if let Some(zone) = state.zones.write().await.remove_by_id(zone_id) {
                debug!(owner_id = %zone.owner_id, zone_id = %zone_id, "Remote zone cleared");
                let _ = events.send(SessionEvent::ZoneCleared {
                    owner_id: zone.owner_id,
                });
            }
        }
        _ => {}
    }
}
