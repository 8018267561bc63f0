//! Device location plumbing.
//!
//! The crate never talks to GPS hardware itself. The embedding platform
//! owns the device subscription and pushes every fix through a
//! [`LocationFeed`]; the tracker consumes the other end. When the tracker
//! stops it drops its [`LocationSource`], after which `push` returns
//! `false` and the platform knows to release the underlying subscription.

use tokio::sync::mpsc;

use crate::models::Position;

const FEED_CAPACITY: usize = 16;

/// Creates a connected feed/source pair.
pub fn location_channel() -> (LocationFeed, LocationSource) {
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    (LocationFeed { tx }, LocationSource { rx })
}

/// Producer half, held by whatever owns the device location callback.
#[derive(Debug, Clone)]
pub struct LocationFeed {
    tx: mpsc::Sender<Position>,
}

impl LocationFeed {
    /// Delivers a fix to the tracker. Returns `false` once the tracker has
    /// stopped listening, which is the signal to unsubscribe from the
    /// device.
    pub async fn push(&self, position: Position) -> bool {
        self.tx.send(position).await.is_ok()
    }

    /// Non-blocking variant for callback contexts. A full queue drops the
    /// fix; the next one supersedes it anyway.
    pub fn try_push(&self, position: Position) -> bool {
        match self.tx.try_send(position) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// True while a tracker is still consuming fixes.
    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consumer half, owned by the tracker task.
#[derive(Debug)]
pub struct LocationSource {
    rx: mpsc::Receiver<Position>,
}

impl LocationSource {
    pub(crate) async fn next(&mut self) -> Option<Position> {
        self.rx.recv().await
    }
}
