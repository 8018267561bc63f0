//! Background position tracker.
//!
//! One task owns the whole tracking lifecycle: it drains the device
//! location feed, keeps [`GroupState`] current, shares fixes over the sync
//! channel, and on a fixed period pushes the last known position to the
//! backend while refetching where everyone else is. Network failures are
//! logged and absorbed; the next cycle is the retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::Position;
use crate::store::GroupState;
use crate::sync::SyncChannel;

use super::api::{TrackingApi, TrackingMode, TrackingSettings};
use super::source::LocationSource;

/// Three decimals keeps a shared position inside roughly a 110 m cell.
const SHARE_ROUND_DECIMALS: u32 = 3;

const COMMAND_CAPACITY: usize = 8;
const MIN_UPDATE_INTERVAL_MS: u64 = 1_000;

#[derive(Debug)]
enum Command {
    ShareNow,
    Stop,
}

/// Handle to the tracker task.
pub struct PositionTracker {
    commands: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

impl PositionTracker {
    /// Starts tracking. The task runs until [`stop`](Self::stop); dropping
    /// the handle leaves it running.
    pub fn spawn(
        state: Arc<GroupState>,
        channel: SyncChannel,
        api: TrackingApi,
        settings: TrackingSettings,
        source: LocationSource,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = tokio::spawn(run_loop(
            state, channel, api, settings, source, command_rx,
        ));
        Self { commands, handle }
    }

    /// In manual mode, shares the last known fix once. Harmless in auto
    /// mode.
    pub async fn share_now(&self) {
        let _ = self.commands.send(Command::ShareNow).await;
    }

    /// Stops the task and releases the location feed. The producer sees
    /// its next push fail and unsubscribes from the device.
    pub async fn stop(self) {
        let _ = self.commands.send(Command::Stop).await;
        let _ = self.handle.await;
    }
}

async fn run_loop(
    state: Arc<GroupState>,
    channel: SyncChannel,
    api: TrackingApi,
    settings: TrackingSettings,
    mut source: LocationSource,
    mut commands: mpsc::Receiver<Command>,
) {
    let user_id = channel.user_id().to_string();
    let group_id = channel.group_id().to_string();

    if let Err(e) = api.start_session(&user_id, &group_id, &settings).await {
        warn!(error = %e, "Tracking session start failed, continuing offline");
    }

    let period = Duration::from_millis(settings.update_interval_ms.max(MIN_UPDATE_INTERVAL_MS));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_fix: Option<Position> = None;
    let mut feed_open = true;

    info!(user_id = %user_id, mode = %settings.mode, "Position tracker started");

    loop {
        tokio::select! {
            fix = source.next(), if feed_open => {
                match fix {
                    Some(position) => {
                        apply_local_fix(&state, &channel, &settings, &user_id, &position).await;
                        last_fix = Some(position);
                    }
                    None => {
                        debug!("Location feed closed by producer");
                        feed_open = false;
                    }
                }
            }
            _ = ticker.tick() => {
                if settings.mode == TrackingMode::Auto {
                    push_last(&api, &settings, &user_id, &group_id, last_fix.as_ref()).await;
                }
                refetch_peers(&api, &state, &user_id, &group_id).await;
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(Command::ShareNow) => {
                        if let Some(fix) = &last_fix {
                            let shared = share_view(fix, &settings);
                            if let Err(e) = channel.send_location(shared).await {
                                debug!(error = %e, "Manual share over channel failed");
                            }
                        }
                        push_last(&api, &settings, &user_id, &group_id, last_fix.as_ref()).await;
                    }
                    Some(Command::Stop) | None => break,
                }
            }
        }
    }

    if let Err(e) = api.stop_session(&user_id, &group_id).await {
        debug!(error = %e, "Tracking session stop failed");
    }
    info!(user_id = %user_id, "Position tracker stopped");
}

/// Applies a device fix locally and, in auto mode, shares it right away.
async fn apply_local_fix(
    state: &GroupState,
    channel: &SyncChannel,
    settings: &TrackingSettings,
    user_id: &str,
    position: &Position,
) {
    let applied = state
        .positions
        .write()
        .await
        .upsert(user_id, position.clone());
    if !applied {
        return;
    }
    state
        .members
        .write()
        .await
        .update_position(user_id, position.clone());

    if settings.mode == TrackingMode::Auto {
        let shared = share_view(position, settings);
        if let Err(e) = channel.send_location(shared).await {
            debug!(error = %e, "Location broadcast failed, next cycle retries");
        }
    }
}

async fn push_last(
    api: &TrackingApi,
    settings: &TrackingSettings,
    user_id: &str,
    group_id: &str,
    last_fix: Option<&Position>,
) {
    let Some(fix) = last_fix else {
        return;
    };
    let shared = share_view(fix, settings);
    if let Err(e) = api.push_position(user_id, group_id, &shared).await {
        debug!(error = %e, "Position push failed, next cycle retries");
    }
}

/// Pulls every peer's last known position into the local store. Stale
/// responses lose to what the channel already delivered.
async fn refetch_peers(api: &TrackingApi, state: &GroupState, user_id: &str, group_id: &str) {
    let peers = match api.group_positions(group_id, user_id).await {
        Ok(peers) => peers,
        Err(e) => {
            debug!(error = %e, "Peer position refetch failed");
            return;
        }
    };

    let mut applied = Vec::new();
    {
        let mut positions = state.positions.write().await;
        for peer in peers {
            if peer.user_id == user_id {
                continue;
            }
            if positions.upsert(&peer.user_id, peer.position.clone()) {
                applied.push((peer.user_id, peer.position));
            }
        }
    }
    if applied.is_empty() {
        return;
    }
    let mut members = state.members.write().await;
    for (member_id, position) in applied {
        members.update_position(&member_id, position);
    }
}

fn share_view(position: &Position, settings: &TrackingSettings) -> Position {
    if settings.share_exact_position {
        position.clone()
    } else {
        position.rounded(SHARE_ROUND_DECIMALS)
    }
}
