//! Process-local state shared by the actors: positions, zones, roster.

mod members;
mod positions;
mod zones;

pub use members::MemberRoster;
pub use positions::{PositionStore, DEFAULT_TRAIL_CAPACITY};
pub use zones::ShootingZoneRegistry;

use tokio::sync::RwLock;

/// The shared mutable state of one group membership, used behind an `Arc`.
///
/// Writers are the sync dispatch task and the tracker; the safety monitor
/// only reads. Lock scope stays small: take a guard, mutate, drop it before
/// awaiting anything else.
pub struct GroupState {
    pub members: RwLock<MemberRoster>,
    pub positions: RwLock<PositionStore>,
    pub zones: RwLock<ShootingZoneRegistry>,
}

impl GroupState {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(MemberRoster::new()),
            positions: RwLock::new(PositionStore::new()),
            zones: RwLock::new(ShootingZoneRegistry::new()),
        }
    }
}

impl Default for GroupState {
    fn default() -> Self {
        Self::new()
    }
}
