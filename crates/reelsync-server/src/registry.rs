//! Connection registry for session and room subscription tracking.
//!
//! Maintains bidirectional mappings: room → sessions (for broadcast) and
//! session → rooms (for cleanup on disconnect). Unregistering a session
//! automatically removes all its subscriptions.

use std::collections::{HashMap, HashSet};

use reelsync_proto::RoomId;

/// Information about a registered session.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// Stable client id observed in this session's frames, once known.
    /// Used for log correlation only; routing is by session id.
    pub client_id: Option<u64>,
}

/// Registry for tracking sessions and their room subscriptions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Session ID → session info
    sessions: HashMap<u64, SessionInfo>,
    /// Room ID → set of subscribed session IDs
    room_subscriptions: HashMap<RoomId, HashSet<u64>>,
    /// Session ID → set of subscribed room IDs
    session_rooms: HashMap<u64, HashSet<RoomId>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. Returns `false` if it already exists.
    pub fn register_session(&mut self, session_id: u64) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }
        self.sessions.insert(session_id, SessionInfo::default());
        true
    }

    /// Check if a session is registered.
    pub fn has_session(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Record the stable client id a session stamps its frames with.
    pub fn note_client_id(&mut self, session_id: u64, client_id: u64) {
        if let Some(info) = self.sessions.get_mut(&session_id) {
            info.client_id = Some(client_id);
        }
    }

    /// Subscribe a session to a room. Returns `false` if the session is
    /// unknown or already subscribed.
    pub fn subscribe(&mut self, session_id: u64, room_id: RoomId) -> bool {
        if !self.sessions.contains_key(&session_id) {
            return false;
        }

        let inserted = self.room_subscriptions.entry(room_id).or_default().insert(session_id);
        self.session_rooms.entry(session_id).or_default().insert(room_id);
        inserted
    }

    /// Unsubscribe a session from a room.
    pub fn unsubscribe(&mut self, session_id: u64, room_id: RoomId) {
        if let Some(sessions) = self.room_subscriptions.get_mut(&room_id) {
            sessions.remove(&session_id);
            if sessions.is_empty() {
                self.room_subscriptions.remove(&room_id);
            }
        }
        if let Some(rooms) = self.session_rooms.get_mut(&session_id) {
            rooms.remove(&room_id);
        }
    }

    /// Sessions subscribed to a room.
    pub fn sessions_in_room(&self, room_id: RoomId) -> impl Iterator<Item = u64> + '_ {
        self.room_subscriptions.get(&room_id).into_iter().flatten().copied()
    }

    /// Rooms a session is subscribed to.
    pub fn rooms_of_session(&self, session_id: u64) -> Vec<RoomId> {
        self.session_rooms.get(&session_id).map(|r| r.iter().copied().collect()).unwrap_or_default()
    }

    /// Unregister a session, removing all its subscriptions.
    ///
    /// Returns the rooms the session was subscribed to, so the caller can
    /// update participant counts.
    pub fn unregister_session(&mut self, session_id: u64) -> Vec<RoomId> {
        self.sessions.remove(&session_id);
        let rooms = self.session_rooms.remove(&session_id).unwrap_or_default();

        for room_id in &rooms {
            if let Some(sessions) = self.room_subscriptions.get_mut(room_id) {
                sessions.remove(&session_id);
                if sessions.is_empty() {
                    self.room_subscriptions.remove(room_id);
                }
            }
        }

        rooms.into_iter().collect()
    }
}
