//! HuntLink Core Library
//!
//! Group safety engine and position synchronization for HuntLink
//! applications.

pub mod alerts;
pub mod geo;
pub mod models;
pub mod safety;
pub mod session;
pub mod store;
pub mod sync;
pub mod tracking;

pub use alerts::{
    AlertAggregator, AlertEffects, AlertEvent, AlertInput, AlertSettings, CooldownConfig,
};
pub use models::{
    Alert, AlertKind, AlertSeverity, Member, MemberStatus, Position, ShootingZone, ZoneKind,
    ZoneParams,
};
pub use safety::{SafetyMonitor, SafetyReport, SafetyStatus};
pub use session::{ChatMessage, ChatStatus, GroupSession, SessionConfig, SessionEvent};
pub use store::{GroupState, MemberRoster, PositionStore, ShootingZoneRegistry};
pub use sync::{
    ChannelConfig, ChannelEvent, ConnectionState, SyncChannel, SyncError, SyncEvent,
};
pub use tracking::{LocationFeed, PositionTracker, TrackingApi, TrackingMode, TrackingSettings};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
