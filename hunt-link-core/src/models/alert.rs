use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Category of an alert. Each kind carries its own notification defaults and
/// deduplication cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Safety,
    Proximity,
    Weather,
    Activity,
    Game,
    Zone,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::Safety => "safety",
            AlertKind::Proximity => "proximity",
            AlertKind::Weather => "weather",
            AlertKind::Activity => "activity",
            AlertKind::Game => "game",
            AlertKind::Zone => "zone",
        };
        write!(f, "{}", s)
    }
}

/// Alert severity, totally ordered: `Critical` outranks everything.
///
/// The declaration order makes the derived `Ord` agree with priority, so
/// `severities.max()` picks the most urgent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Success,
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Numeric priority where 1 is the most urgent, matching how consumers
    /// sort alert lists.
    pub fn priority(&self) -> u8 {
        match self {
            AlertSeverity::Critical => 1,
            AlertSeverity::Warning => 2,
            AlertSeverity::Info => 3,
            AlertSeverity::Success => 4,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
            AlertSeverity::Success => "success",
        };
        write!(f, "{}", s)
    }
}

/// A surfaced notification for the group member.
///
/// Alerts move through a small lifecycle: created unread, optionally marked
/// read, optionally dismissed. Dismissed alerts stay out of active views but
/// are retained until a bulk clear, which is the only hard delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    /// The other member this alert concerns, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    /// Free-form payload for display (distances, zone ids, conditions).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub dismissed: bool,
    /// Operation names a consumer may offer for this alert.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub actions: BTreeSet<String>,
}

impl Alert {
    pub fn new(kind: AlertKind, severity: AlertSeverity) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            member_id: None,
            data: serde_json::Map::new(),
            timestamp: Utc::now(),
            read: false,
            dismissed: false,
            actions: BTreeSet::new(),
        }
    }

    pub fn with_member(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
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

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Unread and not dismissed: should be counted and surfaced prominently.
    pub fn is_unread(&self) -> bool {
        !self.read && !self.dismissed
    }

    /// Anything not yet dismissed shows up in active views.
    pub fn is_active(&self) -> bool {
        !self.dismissed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
        assert!(AlertSeverity::Info > AlertSeverity::Success);

        let max = [
            AlertSeverity::Info,
            AlertSeverity::Critical,
            AlertSeverity::Warning,
        ]
        .into_iter()
        .max();
        assert_eq!(max, Some(AlertSeverity::Critical));
    }

    #[test]
    fn test_severity_priority() {
        assert_eq!(AlertSeverity::Critical.priority(), 1);
        assert_eq!(AlertSeverity::Success.priority(), 4);
    }

    #[test]
    fn test_new_alert_is_unread() {
        let alert = Alert::new(AlertKind::Safety, AlertSeverity::Critical);
        assert!(alert.is_unread());
        assert!(alert.is_active());
        assert!(!alert.read);
        assert!(!alert.dismissed);
    }

    #[test]
    fn test_builders() {
        let alert = Alert::new(AlertKind::Proximity, AlertSeverity::Warning)
            .with_member("user-2")
            .with_data("distance_m", serde_json::json!(145.0))
            .with_action("locate");

        assert_eq!(alert.member_id.as_deref(), Some("user-2"));
        assert_eq!(alert.data["distance_m"], serde_json::json!(145.0));
        assert!(alert.actions.contains("locate"));
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&AlertKind::Weather).unwrap();
        assert_eq!(json, r#""weather""#);
    }

    #[test]
    fn test_json_roundtrip() {
        let alert = Alert::new(AlertKind::Game, AlertSeverity::Success)
            .with_member("user-3")
            .with_data("species", serde_json::json!("moose"));

        let json = serde_json::to_string(&alert).unwrap();
        let parsed: Alert = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, alert.id);
        assert_eq!(parsed.kind, AlertKind::Game);
        assert_eq!(parsed.severity, AlertSeverity::Success);
        assert_eq!(parsed.data["species"], serde_json::json!("moose"));
    }
}
