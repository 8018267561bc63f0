//! Alert creation, lifecycle and duplicate suppression.
//!
//! Raw findings arrive from the safety monitor (or any other producer) as
//! [`AlertInput`]s. The aggregator applies the member's settings, suppresses
//! repeats inside the per-kind cooldown window, stores the surviving alerts
//! and publishes them with resolved side effects to subscribers.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Alert, AlertKind, AlertSeverity};

use super::settings::{AlertEffects, AlertSettings, CooldownConfig};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A candidate alert before settings gating and deduplication.
#[derive(Debug, Clone)]
pub struct AlertInput {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub member_id: Option<String>,
    pub zone_id: Option<Uuid>,
    /// Semantic discriminator within the kind, e.g. `in_shooting_zone` vs
    /// `too_close`. Falls back to the kind name for the dedup key.
    pub finding: Option<String>,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub actions: BTreeSet<String>,
}

impl AlertInput {
    pub fn new(kind: AlertKind, severity: AlertSeverity) -> Self {
        Self {
            kind,
            severity,
            member_id: None,
            zone_id: None,
            finding: None,
            data: serde_json::Map::new(),
            actions: BTreeSet::new(),
        }
    }

    pub fn with_member(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn with_zone(mut self, zone_id: Uuid) -> Self {
        self.zone_id = Some(zone_id);
        self
    }

    pub fn with_finding(mut self, finding: impl Into<String>) -> Self {
        self.finding = Some(finding.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Semantic identity for duplicate suppression: the finding name (or the
    /// kind) plus whichever of member or zone identifies the subject. Content
    /// such as distances never enters the key.
    fn dedup_key(&self) -> (String, String) {
        let what = self
            .finding
            .clone()
            .unwrap_or_else(|| self.kind.to_string());
        let who = self
            .member_id
            .clone()
            .or_else(|| self.zone_id.map(|z| z.to_string()))
            .unwrap_or_default();
        (what, who)
    }

    fn into_alert(self, now: DateTime<Utc>) -> Alert {
        let mut alert = Alert::new(self.kind, self.severity).with_timestamp(now);
        alert.member_id = self.member_id;
        alert.data = self.data;
        alert.actions = self.actions;
        if let Some(zone_id) = self.zone_id {
            alert
                .data
                .insert("zone_id".to_string(), serde_json::json!(zone_id));
        }
        if let Some(finding) = self.finding {
            alert
                .data
                .insert("finding".to_string(), serde_json::json!(finding));
        }
        alert
    }
}

/// Published to subscribers when the alert list changes.
#[derive(Debug, Clone)]
pub enum AlertEvent {
    /// A new alert passed gating and dedup; `effects` already has the
    /// member's sound/vibration settings and the global mute applied.
    Created {
        alert: Alert,
        effects: AlertEffects,
    },
    /// The list was bulk-cleared.
    Cleared { count: usize },
}

struct AggregatorState {
    alerts: Vec<Alert>,
    /// Creation time of the last alert per semantic key.
    last_created: HashMap<(String, String), DateTime<Utc>>,
    settings: AlertSettings,
    cooldowns: CooldownConfig,
    muted: bool,
}

/// Owns the alert list and its lifecycle. Shared behind an `Arc`; every
/// method takes `&self`.
pub struct AlertAggregator {
    state: RwLock<AggregatorState>,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertAggregator {
    pub fn new(settings: AlertSettings, cooldowns: CooldownConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(AggregatorState {
                alerts: Vec::new(),
                last_created: HashMap::new(),
                settings,
                cooldowns,
                muted: false,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    /// Submits a candidate alert with the current time.
    pub async fn submit(&self, input: AlertInput) -> Option<Alert> {
        self.submit_at(input, Utc::now()).await
    }

    /// Submits a candidate alert as of `now`.
    ///
    /// Returns the stored alert, or `None` when the kind is disabled in
    /// settings or an alert with the same semantic key was created inside
    /// the kind's cooldown window. Suppression leaves the cooldown stamp
    /// untouched so a persistent condition fires once per window, not once
    /// per evaluation tick.
    pub async fn submit_at(&self, input: AlertInput, now: DateTime<Utc>) -> Option<Alert> {
        let mut state = self.state.write().await;

        if !state.settings.allows(input.kind) {
            debug!(kind = %input.kind, "alert kind disabled, dropping");
            return None;
        }

        let key = input.dedup_key();
        let window = state.cooldowns.window(input.kind);
        if let Some(created) = state.last_created.get(&key) {
            if now - *created < window {
                debug!(
                    finding = %key.0,
                    subject = %key.1,
                    "duplicate alert inside cooldown, suppressed"
                );
                return None;
            }
        }

        let alert = input.into_alert(now);
        let effects = AlertEffects::resolve(alert.kind, &state.settings, state.muted);
        state.last_created.insert(key, now);
        state.alerts.push(alert.clone());
        debug!(
            id = %alert.id,
            kind = %alert.kind,
            severity = %alert.severity,
            "alert created"
        );

        // No subscribers is fine.
        let _ = self.events.send(AlertEvent::Created {
            alert: alert.clone(),
            effects,
        });
        Some(alert)
    }

    /// Marks an alert read. Dismissed alerts are terminal and stay unchanged.
    pub async fn mark_read(&self, id: Uuid) -> bool {
        let mut state = self.state.write().await;
        match state
            .alerts
            .iter_mut()
            .find(|a| a.id == id && !a.dismissed)
        {
            Some(alert) if !alert.read => {
                alert.read = true;
                true
            }
            _ => false,
        }
    }

    /// Dismisses an alert: hidden from active views, retained until a bulk
    /// clear.
    pub async fn dismiss(&self, id: Uuid) -> bool {
        let mut state = self.state.write().await;
        match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) if !alert.dismissed => {
                alert.dismissed = true;
                true
            }
            _ => false,
        }
    }

    pub async fn mark_all_read(&self) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for alert in state.alerts.iter_mut().filter(|a| a.is_unread()) {
            alert.read = true;
            changed += 1;
        }
        changed
    }

    /// Removes every alert outright. The only hard delete; cooldown stamps
    /// survive so clearing does not re-trigger a storm from the next tick.
    pub async fn clear_all(&self) -> usize {
        let mut state = self.state.write().await;
        let count = state.alerts.len();
        state.alerts.clear();
        if count > 0 {
            let _ = self.events.send(AlertEvent::Cleared { count });
        }
        count
    }

    pub async fn unread_count(&self) -> usize {
        let state = self.state.read().await;
        state.alerts.iter().filter(|a| a.is_unread()).count()
    }

    /// Non-dismissed alerts, newest first.
    pub async fn active(&self) -> Vec<Alert> {
        let state = self.state.read().await;
        let mut alerts: Vec<Alert> = state
            .alerts
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        alerts.reverse();
        alerts
    }

    /// Every retained alert, including dismissed ones, newest first.
    pub async fn all(&self) -> Vec<Alert> {
        let state = self.state.read().await;
        let mut alerts = state.alerts.clone();
        alerts.reverse();
        alerts
    }

    pub async fn set_muted(&self, muted: bool) {
        let mut state = self.state.write().await;
        state.muted = muted;
    }

    pub async fn is_muted(&self) -> bool {
        self.state.read().await.muted
    }

    pub async fn settings(&self) -> AlertSettings {
        self.state.read().await.settings.clone()
    }

    pub async fn set_settings(&self, settings: AlertSettings) {
        let mut state = self.state.write().await;
        state.settings = settings;
    }
}

impl Default for AlertAggregator {
    fn default() -> Self {
        Self::new(AlertSettings::default(), CooldownConfig::default())
    }
}
