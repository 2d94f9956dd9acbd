//! Room manager.
//!
//! Owns every room's canonical playback state and its lifecycle: rooms are
//! created lazily on first join and destroyed immediately when the last
//! participant leaves (no grace period). Rooms are fully independent; no
//! operation touches more than one room.

use std::collections::HashMap;

use reelsync_core::env::Environment;
use reelsync_proto::{Payload, RoomId, payloads::SnapshotPayload};

use crate::room::Room;

/// Errors from room operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    /// Room does not exist. Benign: answered only to the sender, never
    /// fatal for the connection.
    #[error("room not found: {0:#034x}")]
    RoomNotFound(RoomId),
}

/// Outcome of removing a participant from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Whether the session was actually in the room.
    pub removed: bool,
    /// Whether the room was destroyed because it became empty.
    pub destroyed: bool,
}

/// Routes control events into rooms and projects snapshots.
///
/// Generic over `I` (instant type) to support virtual time in tests. All
/// mutation goes through `&mut self`, so callers serialize writes simply
/// by owning the manager exclusively — the production driver holds it
/// behind one async mutex.
pub struct RoomManager<I = std::time::Instant> {
    rooms: HashMap<RoomId, Room<I>>,
}

impl<I> RoomManager<I>
where
    I: Copy + Ord + std::ops::Sub<Output = std::time::Duration>,
{
    /// Create an empty manager.
    pub fn new() -> Self {
        Self { rooms: HashMap::new() }
    }

    /// Check if a room exists.
    pub fn has_room(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Participants in a room, if it exists.
    pub fn participant_count(&self, room_id: RoomId) -> Option<usize> {
        self.rooms.get(&room_id).map(Room::participant_count)
    }

    /// Add a session to a room, creating the room if absent.
    ///
    /// Returns the projected snapshot the joiner should be answered with.
    /// Idempotent: re-joining an occupied room just returns a fresh
    /// snapshot.
    pub fn join<E: Environment<Instant = I>>(
        &mut self,
        room_id: RoomId,
        session_id: u64,
        env: &E,
    ) -> SnapshotPayload {
        let now = env.now();
        let room = self.rooms.entry(room_id).or_insert_with(|| Room::new(now));
        room.add_participant(session_id);
        room.snapshot(now)
    }

    /// Remove a session from a room, destroying it when empty.
    pub fn leave(&mut self, room_id: RoomId, session_id: u64) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return LeaveOutcome { removed: false, destroyed: false };
        };

        let removed = room.remove_participant(session_id);
        let destroyed = room.is_empty();
        if destroyed {
            self.rooms.remove(&room_id);
        }

        LeaveOutcome { removed, destroyed }
    }

    /// Apply a control event to a room.
    ///
    /// Stamps the room's `last_updated` from the authority clock; the
    /// sender's wire timestamp is relayed but never consulted.
    pub fn apply<E: Environment<Instant = I>>(
        &mut self,
        room_id: RoomId,
        payload: &Payload,
        env: &E,
    ) -> Result<(), RoomError> {
        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;
        room.apply(payload, env.now());
        Ok(())
    }

    /// Projected snapshot of a room.
    pub fn snapshot<E: Environment<Instant = I>>(
        &self,
        room_id: RoomId,
        env: &E,
    ) -> Result<SnapshotPayload, RoomError> {
        let room = self.rooms.get(&room_id).ok_or(RoomError::RoomNotFound(room_id))?;
        Ok(room.snapshot(env.now()))
    }
}

impl<I> Default for RoomManager<I>
where
    I: Copy + Ord + std::ops::Sub<Output = std::time::Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> std::fmt::Debug for RoomManager<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager").field("room_count", &self.rooms.len()).finish()
    }
}
