mod alert;
mod member;
mod position;
mod zone;

pub use alert::{Alert, AlertKind, AlertSeverity};
pub use member::{Member, MemberStatus};
pub use position::Position;
pub use zone::{
    ShootingZone, ZoneError, ZoneKind, ZoneParams, DEFAULT_MIN_SAFE_DISTANCE_M, MAX_APERTURE_DEG,
    MAX_RANGE_M, MIN_APERTURE_DEG, MIN_RANGE_M,
};
