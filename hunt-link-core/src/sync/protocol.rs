//! Wire protocol for the group sync channel.
//!
//! Events are single JSON objects with a `type` discriminator. Entities ride
//! along as free-form JSON so the channel never needs to understand every
//! entity schema; only `entity_type` is inspected, for the privacy filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::SyncError;
use crate::models::Position;

/// Entity types that must never leave the device in a `geo.*` event.
pub const PRIVACY_EXCLUDED_ENTITY_TYPES: [&str; 2] = ["hotspot", "corridor"];

/// Event discriminators carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "geo.created")]
    GeoCreated,
    #[serde(rename = "geo.updated")]
    GeoUpdated,
    #[serde(rename = "geo.deleted")]
    GeoDeleted,
    #[serde(rename = "member.joined")]
    MemberJoined,
    #[serde(rename = "member.left")]
    MemberLeft,
    #[serde(rename = "location.update")]
    LocationUpdate,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error,
}

impl EventType {
    /// Entity create/update/delete events, the ones the privacy filter
    /// applies to.
    pub fn is_geo(&self) -> bool {
        matches!(
            self,
            EventType::GeoCreated | EventType::GeoUpdated | EventType::GeoDeleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::GeoCreated => "geo.created",
            EventType::GeoUpdated => "geo.updated",
            EventType::GeoDeleted => "geo.deleted",
            EventType::MemberJoined => "member.joined",
            EventType::MemberLeft => "member.left",
            EventType::LocationUpdate => "location.update",
            EventType::Ping => "ping",
            EventType::Pong => "pong",
            EventType::Error => "error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message on the group channel. Exists only on the wire; nothing
/// here is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Free-form entity payload for `geo.*` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Roster snapshot attached to membership events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_members: Option<Vec<String>>,
    /// Payload of `location.update` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Position>,
    /// Human-readable detail on `error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            user_id: None,
            timestamp: Utc::now(),
            entity: None,
            entity_id: None,
            active_members: None,
            location: None,
            message: None,
        }
    }

    pub fn ping() -> Self {
        Self::new(EventType::Ping)
    }

    pub fn pong() -> Self {
        Self::new(EventType::Pong)
    }

    pub fn location_update(user_id: impl Into<String>, position: Position) -> Self {
        let mut event = Self::new(EventType::LocationUpdate);
        event.user_id = Some(user_id.into());
        event.location = Some(position);
        event
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_entity(mut self, entity: serde_json::Value) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The `entity_type` field of the payload, when there is one.
    pub fn entity_type(&self) -> Option<&str> {
        self.entity
            .as_ref()
            .and_then(|e| e.get("entity_type"))
            .and_then(|t| t.as_str())
    }

    /// Enforces the confidentiality rule: `geo.*` events must not carry a
    /// privacy-excluded entity type. Called on the outbound path before any
    /// network write, and again defensively on inbound events.
    pub fn check_privacy(&self) -> Result<(), SyncError> {
        if !self.event_type.is_geo() {
            return Ok(());
        }
        if let Some(entity_type) = self.entity_type() {
            if PRIVACY_EXCLUDED_ENTITY_TYPES.contains(&entity_type) {
                return Err(SyncError::PrivateEntity(entity_type.to_string()));
            }
        }
        Ok(())
    }

    /// Serializes the event for the wire.
    pub fn encode(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::ProtocolError(e.to_string()))
    }

    /// Parses an event off the wire.
    pub fn decode(raw: &str) -> Result<Self, SyncError> {
        serde_json::from_str(raw).map_err(|e| SyncError::ProtocolError(e.to_string()))
    }
}

/// Builds the WebSocket connect URL for a group membership.
///
/// Accepts `http(s)` or bare `host:port` server URLs and converts the scheme.
pub fn build_ws_url(server_url: &str, group_id: &str, user_id: &str) -> String {
    let base_url = if server_url.starts_with("http://") {
        server_url.replace("http://", "ws://")
    } else if server_url.starts_with("https://") {
        server_url.replace("https://", "wss://")
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };

    let token = format!("user:{}", user_id);
    format!(
        "{}/ws?token={}&group_id={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&token),
        urlencoding::encode(group_id)
    )
}

/// Builds an HTTP URL for a REST path on the same server.
pub fn build_http_url(server_url: &str, path: &str) -> String {
    let base_url = if server_url.starts_with("ws://") {
        server_url.replace("ws://", "http://")
    } else if server_url.starts_with("wss://") {
        server_url.replace("wss://", "https://")
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}
