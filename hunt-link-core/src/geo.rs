//! Great-circle geometry for the safety checks.
//!
//! Pure functions over WGS84 coordinates: haversine distance, initial
//! bearing, and the cone membership test used for shooting zones. No state
//! and no policy; whether a zone should be skipped (e.g. `safe` zones) is
//! the caller's decision.

use crate::models::{Position, ShootingZone};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance between two fixes, in meters.
///
/// Symmetric within floating-point tolerance.
pub fn distance_meters(a: &Position, b: &Position) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial bearing from `from` to `to`, degrees clockwise from north,
/// normalized to `[0, 360)`.
pub fn bearing_degrees(from: &Position, to: &Position) -> f64 {
    let lat_a = from.lat.to_radians();
    let lat_b = to.lat.to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let y = d_lng.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lng.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Smallest angle between two compass directions, in `[0, 180]`.
///
/// Correct across the north wrap: 350 and 5 differ by 15, not 345.
pub fn angle_diff_degrees(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// True when `point` falls inside the zone's cone: within range of the
/// center and within half the aperture of the facing direction.
///
/// A zero range never matches. Callers skip `safe` zones themselves.
pub fn in_cone(point: &Position, zone: &ShootingZone) -> bool {
    if zone.range_m <= 0.0 {
        return false;
    }
    let dist = distance_meters(point, &zone.center);
    if dist > zone.range_m {
        return false;
    }
    let bearing = bearing_degrees(&zone.center, point);
    angle_diff_degrees(bearing, zone.direction_deg) <= zone.aperture_deg / 2.0
}

/// Destination point `distance_m` meters from `start` along `bearing_deg`.
///
/// Used by tests and the simulator to place members at exact offsets.
pub fn offset(start: &Position, bearing_deg: f64, distance_m: f64) -> Position {
    let ang = distance_m / EARTH_RADIUS_M;
    let brg = bearing_deg.to_radians();
    let lat_a = start.lat.to_radians();
    let lng_a = start.lng.to_radians();

    let lat_b = (lat_a.sin() * ang.cos() + lat_a.cos() * ang.sin() * brg.cos()).asin();
    let lng_b = lng_a
        + (brg.sin() * ang.sin() * lat_a.cos()).atan2(ang.cos() - lat_a.sin() * lat_b.sin());

    Position::at(
        lat_b.to_degrees(),
        ((lng_b.to_degrees() + 540.0) % 360.0) - 180.0,
        start.timestamp,
    )
}
