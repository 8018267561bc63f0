use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Position;

/// What a member is currently doing. Drives how aggressively their position
/// is watched by the safety checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Hunting,
    Moving,
    #[default]
    Observing,
    Break,
    Emergency,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Hunting => "hunting",
            MemberStatus::Moving => "moving",
            MemberStatus::Observing => "observing",
            MemberStatus::Break => "break",
            MemberStatus::Emergency => "emergency",
        };
        write!(f, "{}", s)
    }
}

/// A member of the hunting group.
///
/// Created when a join event arrives, updated on every position or status
/// message, removed when the member leaves or the session ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    /// Latest known fix, if any has arrived yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    pub status: MemberStatus,
    pub last_update: DateTime<Utc>,
}

impl Member {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: None,
            status: MemberStatus::default(),
            last_update: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: MemberStatus) -> Self {
        self.status = status;
        self
    }

    /// Applies a new fix and bumps `last_update`.
    pub fn apply_position(&mut self, position: Position) {
        self.position = Some(position);
        self.last_update = Utc::now();
    }

    pub fn set_status(&mut self, status: MemberStatus) {
        self.status = status;
        self.last_update = Utc::now();
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}]", self.name, self.id, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_member_defaults() {
        let member = Member::new("user-1", "Alice");
        assert_eq!(member.id, "user-1");
        assert_eq!(member.name, "Alice");
        assert_eq!(member.status, MemberStatus::Observing);
        assert!(member.position.is_none());
    }

    #[test]
    fn test_apply_position_bumps_last_update() {
        let mut member = Member::new("user-1", "Alice");
        let before = member.last_update;

        member.apply_position(Position::new(46.81, -71.20));

        assert!(member.position.is_some());
        assert!(member.last_update >= before);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&MemberStatus::Break).unwrap();
        assert_eq!(json, r#""break""#);

        let parsed: MemberStatus = serde_json::from_str(r#""emergency""#).unwrap();
        assert_eq!(parsed, MemberStatus::Emergency);
    }

    #[test]
    fn test_display() {
        let member = Member::new("user-1", "Alice").with_status(MemberStatus::Hunting);
        assert_eq!(format!("{}", member), "Alice (user-1) [hunting]");
    }
}
