//! Group roster: who is in the outing right now.

use std::collections::HashMap;

use crate::models::{Member, MemberStatus, Position};

/// Process-local view of the group's membership.
///
/// Entries are created on `member.joined`, refreshed on every position or
/// status message, and removed on `member.left`.
#[derive(Debug, Default)]
pub struct MemberRoster {
    members: HashMap<String, Member>,
}

impl MemberRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member, or refreshes their entry if already present.
    pub fn join(&mut self, member_id: &str, name: &str) -> &Member {
        self.members
            .entry(member_id.to_string())
            .or_insert_with(|| Member::new(member_id, name))
    }

    /// Removes a member, returning their final entry.
    pub fn leave(&mut self, member_id: &str) -> Option<Member> {
        self.members.remove(member_id)
    }

    pub fn update_status(&mut self, member_id: &str, status: MemberStatus) -> bool {
        match self.members.get_mut(member_id) {
            Some(member) => {
                member.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Records a fix on the member entry; unknown members are created with
    /// their id as a placeholder name (a join event may still be in flight).
    pub fn update_position(&mut self, member_id: &str, position: Position) {
        self.members
            .entry(member_id.to_string())
            .or_insert_with(|| Member::new(member_id, member_id))
            .apply_position(position);
    }

    pub fn get(&self, member_id: &str) -> Option<&Member> {
        self.members.get(member_id)
    }

    pub fn contains(&self, member_id: &str) -> bool {
        self.members.contains_key(member_id)
    }

    /// Snapshot of every member, unsorted.
    pub fn members(&self) -> Vec<Member> {
        self.members.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
