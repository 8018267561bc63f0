use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::position::Position;

/// Smallest allowed cone aperture in degrees.
pub const MIN_APERTURE_DEG: f64 = 15.0;
/// Widest allowed cone aperture in degrees.
pub const MAX_APERTURE_DEG: f64 = 120.0;
/// Shortest allowed cone range in meters.
pub const MIN_RANGE_M: f64 = 50.0;
/// Longest allowed cone range in meters.
pub const MAX_RANGE_M: f64 = 500.0;
/// Default buffer around the shooter when no explicit distance is given.
pub const DEFAULT_MIN_SAFE_DISTANCE_M: f64 = 100.0;

/// How a declared zone should be treated by the safety checks.
///
/// `Active` means live fire is possible, `Standby` means the member is set up
/// but not firing, `Safe` marks a no-fire area and never produces findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Active,
    Standby,
    Safe,
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneKind::Active => "active",
            ZoneKind::Standby => "standby",
            ZoneKind::Safe => "safe",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised when zone parameters fall outside the allowed envelope.
#[derive(Error, Debug, PartialEq)]
pub enum ZoneError {
    #[error("direction must be in [0, 360), got {0}")]
    InvalidDirection(f64),

    #[error("aperture must be between {MIN_APERTURE_DEG} and {MAX_APERTURE_DEG} degrees, got {0}")]
    InvalidAperture(f64),

    #[error("range must be between {MIN_RANGE_M} and {MAX_RANGE_M} meters, got {0}")]
    InvalidRange(f64),

    #[error("minimum safe distance must not be negative, got {0}")]
    InvalidMinSafeDistance(f64),
}

/// Parameters for declaring or replacing a shooting zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneParams {
    pub center: Position,
    /// Facing direction, degrees clockwise from north.
    pub direction_deg: f64,
    /// Total angular width of the cone.
    pub aperture_deg: f64,
    /// Maximum reach of the cone in meters.
    pub range_m: f64,
    /// Buffer distance around the shooter; defaults to 100 m.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_safe_distance_m: Option<f64>,
    pub kind: ZoneKind,
}

impl ZoneParams {
    pub fn new(center: Position, direction_deg: f64, aperture_deg: f64, range_m: f64) -> Self {
        Self {
            center,
            direction_deg,
            aperture_deg,
            range_m,
            min_safe_distance_m: None,
            kind: ZoneKind::Active,
        }
    }

    pub fn with_kind(mut self, kind: ZoneKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_min_safe_distance(mut self, meters: f64) -> Self {
        self.min_safe_distance_m = Some(meters);
        self
    }

    /// Checks every parameter against the allowed envelope.
    pub fn validate(&self) -> Result<(), ZoneError> {
        if !(0.0..360.0).contains(&self.direction_deg) {
            return Err(ZoneError::InvalidDirection(self.direction_deg));
        }
        if !(MIN_APERTURE_DEG..=MAX_APERTURE_DEG).contains(&self.aperture_deg) {
            return Err(ZoneError::InvalidAperture(self.aperture_deg));
        }
        if !(MIN_RANGE_M..=MAX_RANGE_M).contains(&self.range_m) {
            return Err(ZoneError::InvalidRange(self.range_m));
        }
        if let Some(d) = self.min_safe_distance_m {
            if d < 0.0 {
                return Err(ZoneError::InvalidMinSafeDistance(d));
            }
        }
        Ok(())
    }
}

/// A sector-shaped danger area: a hunter's probable line of fire.
///
/// At most one zone exists per member; declaring a new one replaces the
/// previous one wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShootingZone {
    pub id: Uuid,
    pub owner_id: String,
    pub center: Position,
    pub direction_deg: f64,
    pub aperture_deg: f64,
    pub range_m: f64,
    pub min_safe_distance_m: f64,
    pub kind: ZoneKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShootingZone {
    /// Builds a zone from validated parameters.
    pub fn from_params(owner_id: impl Into<String>, params: ZoneParams) -> Result<Self, ZoneError> {
        params.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            center: params.center,
            direction_deg: params.direction_deg,
            aperture_deg: params.aperture_deg,
            range_m: params.range_m,
            min_safe_distance_m: params
                .min_safe_distance_m
                .unwrap_or(DEFAULT_MIN_SAFE_DISTANCE_M),
            kind: params.kind,
            created_at: now,
            updated_at: now,
        })
    }

    /// True when the zone can produce danger findings at all.
    pub fn is_armed(&self) -> bool {
        self.kind != ZoneKind::Safe
    }

    pub fn set_kind(&mut self, kind: ZoneKind) {
        self.kind = kind;
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for ShootingZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} zone of {}: {:.0}-degree cone facing {:.0} degrees, {:.0} m",
            self.kind, self.owner_id, self.aperture_deg, self.direction_deg, self.range_m
        )
    }
}
