//! Presence store.
//!
//! Owns "which connections are in which room" together with each member's
//! profile. A room is nothing more than a non-empty membership record keyed by
//! its id: it appears with the first `add_member` and disappears through
//! `destroy_room_if_empty`, so "room not found" and "room destroyed" are the
//! same observation.
//!
//! The store is the only shared mutable resource in the relay. Every operation
//! is a single atomic step against one room key, so two rooms never contend
//! with each other and a leave can never race a join into a lost member.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{RelayError, RelayResult};
use crate::protocol::Participant;

/// Default liveness TTL for a room's membership record (24 hours).
pub const DEFAULT_ROOM_TTL_SECS: i64 = 24 * 3600;

/// A mutation of a member's profile. Nickname is fixed at join time, so mute
/// state is the only field a connection can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileUpdate {
    Muted(bool),
}

impl ProfileUpdate {
    fn apply(self, participant: &mut Participant) {
        match self {
            ProfileUpdate::Muted(is_muted) => participant.is_muted = is_muted,
        }
    }
}

/// Tells the sweep whether a connection id still has an open socket.
pub type LivenessCheck<'a> = dyn Fn(&str) -> bool + Send + Sync + 'a;

/// Storage contract for room membership.
///
/// Implementations must make each call atomic per room. The in-process
/// implementation below uses DashMap shard locks; a shared external store
/// would use its own per-key primitives.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Add a member. Returns `true` when this created the room.
    /// Fails with `AlreadyMember` if the connection is already in any room.
    async fn add_member(&self, room_id: &str, profile: Participant) -> RelayResult<bool>;

    /// Remove a member and return the post-removal count. Removing an absent
    /// member is a no-op.
    async fn remove_member(&self, room_id: &str, connection_id: &str) -> RelayResult<usize>;

    /// Profiles currently in the room, optionally excluding one connection.
    async fn list_members(
        &self,
        room_id: &str,
        exclude: Option<&str>,
    ) -> RelayResult<Vec<Participant>>;

    /// Number of members in the room (0 when the room does not exist).
    async fn member_count(&self, room_id: &str) -> RelayResult<usize>;

    /// The room and profile of a connection, if it has joined one.
    async fn lookup_member(&self, connection_id: &str)
        -> RelayResult<Option<(String, Participant)>>;

    /// Apply a profile change and return the member's room id.
    /// Fails with `NotAMember` if the connection has no room.
    async fn update_profile(&self, connection_id: &str, update: ProfileUpdate)
        -> RelayResult<String>;

    /// Delete the room only if it has no members. Returns whether it was
    /// deleted.
    async fn destroy_room_if_empty(&self, room_id: &str) -> RelayResult<bool>;

    /// Drop rooms whose TTL lapsed and none of whose members is still
    /// connected according to `is_live`. Lapsed rooms with a live member get
    /// a fresh TTL instead. Returns the ids of the rooms removed.
    async fn sweep_expired(&self, is_live: &LivenessCheck) -> RelayResult<Vec<String>>;

    /// Number of live rooms.
    async fn room_count(&self) -> RelayResult<usize>;

    /// Number of joined connections across all rooms.
    async fn participant_count(&self) -> RelayResult<usize>;
}

/// Membership record for one room.
#[derive(Debug)]
struct RoomRecord {
    members: HashMap<String, Participant>,
    expires_at: DateTime<Utc>,
}

impl RoomRecord {
    fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            members: HashMap::new(),
            expires_at,
        }
    }
}

/// In-process presence store backed by concurrent maps.
///
/// Lock order is always `memberships` before `rooms`; no code path holds a
/// `rooms` guard while touching `memberships`.
#[derive(Clone)]
pub struct MemoryPresenceStore {
    /// Room ID → membership record.
    rooms: Arc<DashMap<String, RoomRecord>>,

    /// Connection ID → room ID, for O(1) "which room is this connection in".
    memberships: Arc<DashMap<String, String>>,

    ttl: Duration,
}

impl MemoryPresenceStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            memberships: Arc::new(DashMap::new()),
            ttl: Duration::seconds(ttl_secs),
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.ttl
    }
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_TTL_SECS)
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn add_member(&self, room_id: &str, profile: Participant) -> RelayResult<bool> {
        let slot = match self.memberships.entry(profile.id.clone()) {
            Entry::Occupied(_) => return Err(RelayError::AlreadyMember),
            Entry::Vacant(slot) => slot,
        };

        let expires_at = self.expiry();
        let created = {
            let mut room = self
                .rooms
                .entry(room_id.to_string())
                .or_insert_with(|| RoomRecord::new(expires_at));
            let created = room.members.is_empty();
            room.members.insert(profile.id.clone(), profile);
            room.expires_at = expires_at;
            created
        };
        slot.insert(room_id.to_string());

        Ok(created)
    }

    async fn remove_member(&self, room_id: &str, connection_id: &str) -> RelayResult<usize> {
        self.memberships
            .remove_if(connection_id, |_, joined| joined == room_id);

        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return Ok(0);
        };
        room.members.remove(connection_id);
        room.expires_at = self.expiry();
        Ok(room.members.len())
    }

    async fn list_members(
        &self,
        room_id: &str,
        exclude: Option<&str>,
    ) -> RelayResult<Vec<Participant>> {
        Ok(self
            .rooms
            .get(room_id)
            .map(|room| {
                room.members
                    .values()
                    .filter(|p| Some(p.id.as_str()) != exclude)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn member_count(&self, room_id: &str) -> RelayResult<usize> {
        Ok(self
            .rooms
            .get(room_id)
            .map(|room| room.members.len())
            .unwrap_or(0))
    }

    async fn lookup_member(
        &self,
        connection_id: &str,
    ) -> RelayResult<Option<(String, Participant)>> {
        let Some(room_id) = self.memberships.get(connection_id).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        Ok(self
            .rooms
            .get(&room_id)
            .and_then(|room| room.members.get(connection_id).cloned())
            .map(|profile| (room_id, profile)))
    }

    async fn update_profile(
        &self,
        connection_id: &str,
        update: ProfileUpdate,
    ) -> RelayResult<String> {
        let room_id = self
            .memberships
            .get(connection_id)
            .map(|r| r.value().clone())
            .ok_or(RelayError::NotAMember)?;

        let mut room = self.rooms.get_mut(&room_id).ok_or(RelayError::NotAMember)?;
        let member = room
            .members
            .get_mut(connection_id)
            .ok_or(RelayError::NotAMember)?;
        update.apply(member);
        room.expires_at = self.expiry();

        Ok(room_id)
    }

    async fn destroy_room_if_empty(&self, room_id: &str) -> RelayResult<bool> {
        Ok(self
            .rooms
            .remove_if(room_id, |_, room| room.members.is_empty())
            .is_some())
    }

    async fn sweep_expired(&self, is_live: &LivenessCheck) -> RelayResult<Vec<String>> {
        let now = Utc::now();
        let has_live_member = |room: &RoomRecord| room.members.keys().any(|id| is_live(id));

        let expired: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::new();
        for room_id in expired {
            // A quiet call is still a call.
            if let Some(mut room) = self.rooms.get_mut(&room_id) {
                if has_live_member(&*room) {
                    room.expires_at = self.expiry();
                    continue;
                }
            }

            // Re-check under the shard lock: a join may have refreshed it.
            let Some((_, room)) = self.rooms.remove_if(&room_id, |_, room| {
                room.expires_at <= now && !has_live_member(room)
            }) else {
                continue;
            };
            for connection_id in room.members.keys() {
                self.memberships
                    .remove_if(connection_id, |_, joined| *joined == room_id);
            }
            removed.push(room_id);
        }

        Ok(removed)
    }

    async fn room_count(&self) -> RelayResult<usize> {
        Ok(self.rooms.len())
    }

    async fn participant_count(&self) -> RelayResult<usize> {
        Ok(self.memberships.len())
    }
}
