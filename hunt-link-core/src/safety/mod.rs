//! Danger evaluation for the group.
//!
//! The evaluation itself is pure: given the current positions and zones it
//! produces a [`SafetyReport`] and changes nothing. Scheduling and alert
//! creation live in [`monitor`] and the alert aggregator; duplicate
//! suppression is entirely the aggregator's job, so repeated runs over
//! unchanged inputs yield identical reports.

mod monitor;

pub use monitor::{MonitorConfig, SafetyMonitor, DEFAULT_MONITOR_INTERVAL};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::geo;
use crate::models::{AlertKind, AlertSeverity, Position, ZoneKind};
use crate::store::{PositionStore, ShootingZoneRegistry};

/// Overall safety level, ordered so `max()` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStatus {
    #[default]
    Safe,
    Caution,
    Warning,
    Danger,
}

impl SafetyStatus {
    /// The alert severity a finding of this status surfaces as.
    pub fn alert_severity(&self) -> AlertSeverity {
        match self {
            SafetyStatus::Danger => AlertSeverity::Critical,
            SafetyStatus::Warning => AlertSeverity::Warning,
            SafetyStatus::Caution => AlertSeverity::Info,
            SafetyStatus::Safe => AlertSeverity::Success,
        }
    }
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SafetyStatus::Safe => "safe",
            SafetyStatus::Caution => "caution",
            SafetyStatus::Warning => "warning",
            SafetyStatus::Danger => "danger",
        };
        write!(f, "{}", s)
    }
}

/// What kind of geometric overlap was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The observer stands inside another member's cone.
    InShootingZone,
    /// The observer is within the minimum safe distance of a zone center.
    TooClose,
    /// Another member stands inside the observer's own cone.
    MemberInMyZone,
}

impl FindingKind {
    /// Stable name used as the deduplication key component.
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::InShootingZone => "in_shooting_zone",
            FindingKind::TooClose => "too_close",
            FindingKind::MemberInMyZone => "member_in_my_zone",
        }
    }

    /// The alert category this finding surfaces under. Cone hits are safety
    /// alerts; drifting inside the buffer distance is a proximity alert and
    /// shares its cooldown.
    pub fn alert_kind(&self) -> AlertKind {
        match self {
            FindingKind::InShootingZone | FindingKind::MemberInMyZone => AlertKind::Safety,
            FindingKind::TooClose => AlertKind::Proximity,
        }
    }
}

/// A single danger detection for one observer/zone pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyFinding {
    pub kind: FindingKind,
    /// The other party: the zone owner, or the intruding member for
    /// [`FindingKind::MemberInMyZone`].
    pub member_id: String,
    pub zone_id: Uuid,
    pub distance_m: f64,
    pub status: SafetyStatus,
}

/// Outcome of one evaluation run for one observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyReport {
    pub observer_id: String,
    pub status: SafetyStatus,
    pub findings: Vec<SafetyFinding>,
    pub generated_at: DateTime<Utc>,
}

impl SafetyReport {
    /// An all-clear report, also used when the observer has no known
    /// position: absence of data is never treated as danger.
    pub fn safe(observer_id: impl Into<String>) -> Self {
        Self {
            observer_id: observer_id.into(),
            status: SafetyStatus::Safe,
            findings: Vec::new(),
            generated_at: Utc::now(),
        }
    }
}

/// Two members closer together than the proximity threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityHit {
    pub member_id: String,
    pub distance_m: f64,
}

fn zone_severity(kind: ZoneKind) -> SafetyStatus {
    match kind {
        ZoneKind::Active => SafetyStatus::Danger,
        _ => SafetyStatus::Warning,
    }
}

/// Evaluates every zone against the observer and the observer's own zone
/// against every other member.
///
/// Safe zones and the observer's own zone are skipped on the inbound pass;
/// the outbound pass only runs when the observer's zone is armed. The
/// overall status is the worst finding, `Safe` when there are none.
pub fn evaluate(
    observer_id: &str,
    positions: &PositionStore,
    zones: &ShootingZoneRegistry,
) -> SafetyReport {
    let observer_pos = match positions.latest(observer_id) {
        Some(pos) => pos,
        None => return SafetyReport::safe(observer_id),
    };

    let mut findings = Vec::new();

    for zone in zones.all() {
        if zone.owner_id == observer_id || !zone.is_armed() {
            continue;
        }

        let distance = geo::distance_meters(observer_pos, &zone.center);
        if geo::in_cone(observer_pos, zone) {
            findings.push(SafetyFinding {
                kind: FindingKind::InShootingZone,
                member_id: zone.owner_id.clone(),
                zone_id: zone.id,
                distance_m: distance,
                status: zone_severity(zone.kind),
            });
        } else if distance < zone.min_safe_distance_m {
            findings.push(SafetyFinding {
                kind: FindingKind::TooClose,
                member_id: zone.owner_id.clone(),
                zone_id: zone.id,
                distance_m: distance,
                status: SafetyStatus::Caution,
            });
        }
    }

    if let Some(my_zone) = zones.by_owner(observer_id).filter(|z| z.is_armed()) {
        for (other_id, other_pos) in positions.all() {
            if other_id == observer_id {
                continue;
            }
            if geo::in_cone(other_pos, my_zone) {
                findings.push(SafetyFinding {
                    kind: FindingKind::MemberInMyZone,
                    member_id: other_id.to_string(),
                    zone_id: my_zone.id,
                    distance_m: geo::distance_meters(other_pos, &my_zone.center),
                    status: zone_severity(my_zone.kind),
                });
            }
        }
    }

    let status = findings
        .iter()
        .map(|f| f.status)
        .max()
        .unwrap_or(SafetyStatus::Safe);

    SafetyReport {
        observer_id: observer_id.to_string(),
        status,
        findings,
        generated_at: Utc::now(),
    }
}

/// Members within `threshold_m` of the observer.
///
/// A non-positive threshold disables proximity detection entirely.
pub fn proximity_hits(
    observer_id: &str,
    positions: &PositionStore,
    threshold_m: f64,
) -> Vec<ProximityHit> {
    if threshold_m <= 0.0 {
        return Vec::new();
    }
    let observer_pos: &Position = match positions.latest(observer_id) {
        Some(pos) => pos,
        None => return Vec::new(),
    };

    let mut hits = Vec::new();
    for (other_id, other_pos) in positions.all() {
        if other_id == observer_id {
            continue;
        }
        let distance = geo::distance_meters(observer_pos, other_pos);
        if distance < threshold_m {
            hits.push(ProximityHit {
                member_id: other_id.to_string(),
                distance_m: distance,
            });
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Position, ZoneKind, ZoneParams};

    fn setup() -> (PositionStore, ShootingZoneRegistry) {
        (PositionStore::new(), ShootingZoneRegistry::new())
    }

    fn zone_params(kind: ZoneKind) -> ZoneParams {
        ZoneParams::new(Position::new(46.81, -71.20), 90.0, 60.0, 300.0).with_kind(kind)
    }

    #[test]
    fn test_no_position_yields_safe() {
        let (positions, zones) = setup();
        let report = evaluate("user-b", &positions, &zones);

        assert_eq!(report.status, SafetyStatus::Safe);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_observer_in_active_zone_is_danger() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Active)).unwrap();

        // Bearing 100, 250 m from the zone center: inside the cone.
        positions.upsert("user-b", geo::offset(&zone.center, 100.0, 250.0));

        let report = evaluate("user-b", &positions, &zones);
        assert_eq!(report.status, SafetyStatus::Danger);
        assert_eq!(report.findings.len(), 1);

        let finding = &report.findings[0];
        assert_eq!(finding.kind, FindingKind::InShootingZone);
        assert_eq!(finding.member_id, "user-a");
        assert_eq!(finding.zone_id, zone.id);
        assert!((finding.distance_m - 250.0).abs() < 2.0);
    }

    #[test]
    fn test_standby_zone_is_warning() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Standby)).unwrap();
        positions.upsert("user-b", geo::offset(&zone.center, 90.0, 200.0));

        let report = evaluate("user-b", &positions, &zones);
        assert_eq!(report.status, SafetyStatus::Warning);
    }

    #[test]
    fn test_safe_zone_never_alerts() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Safe)).unwrap();
        positions.upsert("user-b", geo::offset(&zone.center, 90.0, 100.0));

        let report = evaluate("user-b", &positions, &zones);
        assert_eq!(report.status, SafetyStatus::Safe);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_behind_zone_but_close_is_caution() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Active)).unwrap();

        // Bearing 270 is directly behind the cone; 80 m is inside the
        // 100 m minimum safe distance.
        positions.upsert("user-b", geo::offset(&zone.center, 270.0, 80.0));

        let report = evaluate("user-b", &positions, &zones);
        assert_eq!(report.status, SafetyStatus::Caution);
        assert_eq!(report.findings[0].kind, FindingKind::TooClose);
    }

    #[test]
    fn test_member_in_my_zone() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Active)).unwrap();

        positions.upsert("user-a", zone.center.clone());
        positions.upsert("user-c", geo::offset(&zone.center, 95.0, 150.0));

        let report = evaluate("user-a", &positions, &zones);
        let finding = report
            .findings
            .iter()
            .find(|f| f.kind == FindingKind::MemberInMyZone)
            .expect("intruder finding");
        assert_eq!(finding.member_id, "user-c");
        assert_eq!(report.status, SafetyStatus::Danger);
    }

    #[test]
    fn test_own_zone_ignored_for_inbound_pass() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Active)).unwrap();

        // The owner standing in their own cone is not a danger to themselves.
        positions.upsert("user-a", geo::offset(&zone.center, 90.0, 100.0));

        let report = evaluate("user-a", &positions, &zones);
        assert_eq!(report.status, SafetyStatus::Safe);
    }

    #[test]
    fn test_status_is_worst_finding() {
        let (mut positions, mut zones) = setup();
        let active = zones.set("user-a", zone_params(ZoneKind::Active)).unwrap();
        zones
            .set(
                "user-c",
                ZoneParams::new(geo::offset(&active.center, 90.0, 250.0), 270.0, 60.0, 300.0)
                    .with_kind(ZoneKind::Standby),
            )
            .unwrap();

        // user-b sits in both cones: danger from the active one wins.
        positions.upsert("user-b", geo::offset(&active.center, 90.0, 150.0));

        let report = evaluate("user-b", &positions, &zones);
        assert!(report.findings.len() >= 2);
        assert_eq!(report.status, SafetyStatus::Danger);
    }

    #[test]
    fn test_identical_inputs_identical_findings() {
        let (mut positions, mut zones) = setup();
        let zone = zones.set("user-a", zone_params(ZoneKind::Active)).unwrap();
        positions.upsert("user-b", geo::offset(&zone.center, 100.0, 250.0));

        let first = evaluate("user-b", &positions, &zones);
        let second = evaluate("user-b", &positions, &zones);
        assert_eq!(first.findings, second.findings);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn test_proximity_hits() {
        let (mut positions, _) = setup();
        let base = Position::new(46.81, -71.20);
        positions.upsert("user-a", base.clone());
        positions.upsert("user-b", geo::offset(&base, 0.0, 150.0));
        positions.upsert("user-c", geo::offset(&base, 0.0, 500.0));

        let hits = proximity_hits("user-a", &positions, 200.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].member_id, "user-b");
        assert!((hits[0].distance_m - 150.0).abs() < 2.0);
    }

    #[test]
    fn test_proximity_disabled_by_zero_threshold() {
        let (mut positions, _) = setup();
        let base = Position::new(46.81, -71.20);
        positions.upsert("user-a", base.clone());
        positions.upsert("user-b", geo::offset(&base, 0.0, 10.0));

        assert!(proximity_hits("user-a", &positions, 0.0).is_empty());
    }
}
