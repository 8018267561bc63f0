//! Position tracking: device fixes in, shared positions out.

mod api;
mod source;
mod tracker;

pub use api::{
    MemberPosition, TrackingApi, TrackingMode, TrackingSettings, DEFAULT_UPDATE_INTERVAL_MS,
};
pub use source::{location_channel, LocationFeed, LocationSource};
pub use tracker::PositionTracker;
