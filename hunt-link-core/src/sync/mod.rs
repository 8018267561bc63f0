//! Privacy-filtered WebSocket synchronization with the group.

mod channel;
mod error;
mod protocol;

pub use channel::{
    ChannelConfig, ChannelEvent, ConnectionState, SyncChannel, CLOSE_FORBIDDEN,
    CLOSE_UNAUTHORIZED, HEARTBEAT_INTERVAL, RECONNECT_DELAY,
};
pub use error::SyncError;
pub use protocol::{
    build_http_url, build_ws_url, EventType, SyncEvent, PRIVACY_EXCLUDED_ENTITY_TYPES,
};
