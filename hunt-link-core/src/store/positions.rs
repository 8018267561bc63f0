//! In-memory cache of the latest known position per member, with bounded
//! trail history.
//!
//! This is an authoritative process-local cache refreshed by the tracker and
//! by inbound sync events. It is not durable; durability belongs to the
//! backend store.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::models::Position;

/// Default number of trail points kept per member.
pub const DEFAULT_TRAIL_CAPACITY: usize = 50;

/// Latest-position cache plus per-member trails.
///
/// Positions arrive from several network hops with no reordering protection,
/// so the stored timestamp is authoritative: an incoming fix older than the
/// current one for that member is discarded.
#[derive(Debug)]
pub struct PositionStore {
    latest: HashMap<String, Position>,
    trails: HashMap<String, VecDeque<Position>>,
    trail_capacity: usize,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::with_trail_capacity(DEFAULT_TRAIL_CAPACITY)
    }

    pub fn with_trail_capacity(trail_capacity: usize) -> Self {
        Self {
            latest: HashMap::new(),
            trails: HashMap::new(),
            trail_capacity,
        }
    }

    /// Applies a fix for a member, replacing the previous one.
    ///
    /// Returns `false` (and changes nothing) when the fix is older than the
    /// stored one. Equal timestamps are applied: the most recent arrival wins.
    pub fn upsert(&mut self, member_id: &str, position: Position) -> bool {
        if let Some(current) = self.latest.get(member_id) {
            if current.is_newer_than(&position) {
                debug!(
                    member_id,
                    incoming = %position.timestamp,
                    stored = %current.timestamp,
                    "discarding stale position"
                );
                return false;
            }
        }

        if self.trail_capacity > 0 {
            let trail = self
                .trails
                .entry(member_id.to_string())
                .or_insert_with(|| VecDeque::with_capacity(self.trail_capacity));
            if trail.len() == self.trail_capacity {
                trail.pop_front();
            }
            trail.push_back(position.clone());
        }

        self.latest.insert(member_id.to_string(), position);
        true
    }

    /// Latest known fix for a member.
    pub fn latest(&self, member_id: &str) -> Option<&Position> {
        self.latest.get(member_id)
    }

    /// Every member with a known position.
    pub fn all(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.latest.iter().map(|(id, pos)| (id.as_str(), pos))
    }

    /// Up to `max` most recent trail points for a member, oldest first.
    pub fn trail(&self, member_id: &str, max: usize) -> Vec<Position> {
        match self.trails.get(member_id) {
            Some(trail) => {
                let skip = trail.len().saturating_sub(max);
                trail.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Drops a member's position and trail, e.g. when they leave the group.
    pub fn remove(&mut self, member_id: &str) {
        self.latest.remove(member_id);
        self.trails.remove(member_id);
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

impl Default for PositionStore {
    fn default() -> Self {
        Self::new()
    }
}
