//! Sync error types.

/// Errors that can occur on the group sync channel and the tracking API.
#[derive(Debug)]
pub enum SyncError {
    /// Failed to connect to server
    ConnectionError(String),
    /// WebSocket error
    WebSocketError(String),
    /// Event encode/decode error
    ProtocolError(String),
    /// HTTP request failed
    HttpError(String),
    /// Outbound event carried a confidential entity type
    PrivateEntity(String),
    /// Operation attempted on a closed channel
    ChannelClosed,
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::ConnectionError(e) => write!(f, "Connection error: {}", e),
            SyncError::WebSocketError(e) => write!(f, "WebSocket error: {}", e),
            SyncError::ProtocolError(e) => write!(f, "Sync protocol error: {}", e),
            SyncError::HttpError(e) => write!(f, "HTTP error: {}", e),
            SyncError::PrivateEntity(entity_type) => {
                write!(
                    f,
                    "Refusing to broadcast entity of private type '{}'",
                    entity_type
                )
            }
            SyncError::ChannelClosed => write!(f, "Sync channel is closed"),
        }
    }
}

impl std::error::Error for SyncError {}
