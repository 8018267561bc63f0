use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A geographic fix in WGS84 degrees.
///
/// Positions are immutable values: a newer fix replaces the previous one for
/// a member rather than mutating it. Optional fields come straight from the
/// device and are omitted on the wire when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Horizontal accuracy in meters, if the device reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Heading in degrees clockwise from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Ground speed in meters per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// Creates a position at the current time.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy: None,
            heading: None,
            speed: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a position with an explicit timestamp.
    pub fn at(lat: f64, lng: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            ..Self::new(lat, lng)
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    /// Returns a copy with coordinates rounded to `decimals` places.
    ///
    /// Used when a member opts out of sharing exact positions; three decimals
    /// is roughly 110 m of latitude.
    pub fn rounded(&self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        Self {
            lat: (self.lat * factor).round() / factor,
            lng: (self.lng * factor).round() / factor,
            accuracy: self.accuracy,
            heading: self.heading,
            speed: self.speed,
            timestamp: self.timestamp,
        }
    }

    /// True when this fix is strictly newer than `other`.
    pub fn is_newer_than(&self, other: &Position) -> bool {
        self.timestamp > other.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_position_has_current_timestamp() {
        let before = Utc::now();
        let pos = Position::new(46.81, -71.20);
        let after = Utc::now();

        assert!(pos.timestamp >= before && pos.timestamp <= after);
        assert_eq!(pos.lat, 46.81);
        assert_eq!(pos.lng, -71.20);
        assert!(pos.accuracy.is_none());
    }

    #[test]
    fn test_builders() {
        let pos = Position::new(46.81, -71.20)
            .with_accuracy(12.5)
            .with_heading(270.0)
            .with_speed(1.4);

        assert_eq!(pos.accuracy, Some(12.5));
        assert_eq!(pos.heading, Some(270.0));
        assert_eq!(pos.speed, Some(1.4));
    }

    #[test]
    fn test_rounded() {
        let pos = Position::new(46.812345, -71.204321).rounded(3);
        assert_eq!(pos.lat, 46.812);
        assert_eq!(pos.lng, -71.204);
    }

    #[test]
    fn test_is_newer_than() {
        let now = Utc::now();
        let older = Position::at(1.0, 1.0, now - Duration::seconds(10));
        let newer = Position::at(1.0, 1.0, now);

        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!newer.is_newer_than(&newer));
    }

    #[test]
    fn test_json_skips_missing_optionals() {
        let pos = Position::new(46.81, -71.20);
        let json = serde_json::to_string(&pos).unwrap();

        assert!(!json.contains("accuracy"));
        assert!(!json.contains("heading"));
        assert!(!json.contains("speed"));

        let parsed: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pos);
    }

    #[test]
    fn test_json_accepts_bare_lat_lng() {
        // Wire messages may carry only {lat, lng}; everything else defaults.
        let parsed: Position = serde_json::from_str(r#"{"lat":46.8,"lng":-71.2}"#).unwrap();
        assert_eq!(parsed.lat, 46.8);
        assert!(parsed.accuracy.is_none());
    }
}
