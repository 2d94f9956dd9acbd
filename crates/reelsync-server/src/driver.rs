//! Server driver.
//!
//! Action-based state machine at the center of the authority. The runtime
//! (QUIC listener or simulation harness) feeds it [`ServerEvent`]s and
//! executes the [`ServerAction`]s it returns; the driver itself performs no
//! I/O, which keeps every routing decision unit-testable under virtual time.

use reelsync_core::Environment;
use reelsync_proto::{
    EventKind, Frame, FrameHeader, Payload, RoomId,
    payloads::ErrorPayload,
};

use crate::{
    error::ServerError,
    registry::ConnectionRegistry,
    room_manager::{RoomError, RoomManager},
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Connection that sent the frame
        session_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for gauge reporting
    Tick,
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Send a frame to a specific session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Broadcast frame to all sessions in a room
    BroadcastToRoom {
        /// Target room ID
        room_id: RoomId,
        /// Frame to broadcast
        frame: Frame,
        /// Session to exclude from broadcast (the original sender)
        exclude_session: Option<u64>,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Action-based server driver.
///
/// Orchestrates session registration, room state, and frame routing. Control
/// frames are broadcast byte-for-byte as received; the authority mutates its
/// own room state from them but never rewrites a relayed frame.
pub struct ServerDriver<E: Environment> {
    /// Session/room registry
    registry: ConnectionRegistry,
    /// Authoritative room state
    room_manager: RoomManager<E::Instant>,
    /// Environment (time, RNG)
    env: E,
    /// Server configuration
    config: ServerConfig,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a new server driver.
    pub fn new(env: E, config: ServerConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), room_manager: RoomManager::new(), env, config }
    }

    /// Process a server event and return actions to execute.
    ///
    /// This is the main entry point for the server driver.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id } => {
                self.handle_connection_accepted(session_id)
            },
            ServerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame_received(session_id, frame)
            },
            ServerEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason))
            },
            ServerEvent::Tick => Ok(self.handle_tick()),
        }
    }

    /// Handle a new connection being accepted.
    fn handle_connection_accepted(
        &mut self,
        session_id: u64,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if self.registry.session_count() >= self.config.max_connections {
            return Ok(vec![ServerAction::CloseConnection {
                session_id,
                reason: "max connections exceeded".to_string(),
            }]);
        }

        self.registry.register_session(session_id);

        Ok(vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection accepted, session_id={session_id}"),
        }])
    }

    /// Handle a frame received from a connection.
    ///
    /// Malformed input never kills the connection: frames with an unknown
    /// kind or an undecodable payload are logged and dropped, and the
    /// session stays up.
    fn handle_frame_received(
        &mut self,
        session_id: u64,
        frame: Frame,
    ) -> Result<Vec<ServerAction>, ServerError> {
        if !self.registry.has_session(session_id) {
            return Err(ServerError::SessionNotFound(session_id));
        }

        let room_id = frame.header.room_id();
        if room_id == 0 {
            // Unroutable; silent drop is deliberate so a confused client
            // cannot spam the logs.
            return Ok(Vec::new());
        }

        let Some(kind) = frame.header.kind_enum() else {
            return Ok(vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!(
                    "dropping frame with unknown kind {:#06x} from session {session_id}",
                    frame.header.kind()
                ),
            }]);
        };

        self.registry.note_client_id(session_id, frame.header.sender_id());

        match kind {
            EventKind::Join => Ok(self.handle_join(session_id, room_id)),
            EventKind::Leave => Ok(self.handle_leave(session_id, room_id)),
            EventKind::GetCurrent => Ok(self.handle_get_current(session_id, room_id)),
            kind if kind.is_room_control() => Ok(self.handle_room_control(session_id, &frame)),
            EventKind::Snapshot | EventKind::Error => Ok(vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!(
                    "dropping authority-only frame kind {kind:?} from session {session_id}"
                ),
            }]),
            kind => Ok(vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("dropping unhandled frame kind {kind:?} from session {session_id}"),
            }]),
        }
    }

    /// Join a session to a room and answer with a projected snapshot.
    fn handle_join(&mut self, session_id: u64, room_id: RoomId) -> Vec<ServerAction> {
        self.registry.subscribe(session_id, room_id);
        let snapshot = self.room_manager.join(room_id, session_id, &self.env);

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "session {session_id} joined room {room_id:#034x} ({} participants)",
                snapshot.participant_count
            ),
        }];
        actions.extend(self.snapshot_reply(session_id, room_id, snapshot));
        actions
    }

    /// Remove a session from a room.
    fn handle_leave(&mut self, session_id: u64, room_id: RoomId) -> Vec<ServerAction> {
        self.registry.unsubscribe(session_id, room_id);
        let outcome = self.room_manager.leave(room_id, session_id);

        if outcome.destroyed {
            vec![ServerAction::Log {
                level: LogLevel::Info,
                message: format!("room {room_id:#034x} destroyed (last participant left)"),
            }]
        } else if outcome.removed {
            vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} left room {room_id:#034x}"),
            }]
        } else {
            Vec::new()
        }
    }

    /// Answer an explicit state query with a projected snapshot.
    fn handle_get_current(&mut self, session_id: u64, room_id: RoomId) -> Vec<ServerAction> {
        match self.room_manager.snapshot(room_id, &self.env) {
            Ok(snapshot) => self.snapshot_reply(session_id, room_id, snapshot),
            Err(e @ RoomError::RoomNotFound(_)) => self.error_reply(session_id, room_id, &e),
        }
    }

    /// Apply a control frame to room state and relay it unmodified.
    ///
    /// The broadcast excludes the sending session; echo suppression by
    /// sender id on the client side is the second line of defense for
    /// frames that arrive via a reconnected session.
    fn handle_room_control(&mut self, session_id: u64, frame: &Frame) -> Vec<ServerAction> {
        let room_id = frame.header.room_id();

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                return vec![ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "dropping undecodable {:?} payload from session {session_id}: {e}",
                        frame.header.kind_enum()
                    ),
                }];
            },
        };

        match self.room_manager.apply(room_id, &payload, &self.env) {
            Ok(()) => vec![ServerAction::BroadcastToRoom {
                room_id,
                frame: frame.clone(),
                exclude_session: Some(session_id),
            }],
            Err(e @ RoomError::RoomNotFound(_)) => self.error_reply(session_id, room_id, &e),
        }
    }

    /// Handle a connection being closed.
    ///
    /// The session implicitly leaves every room it was subscribed to, so an
    /// abrupt disconnect cannot strand participant counts.
    fn handle_connection_closed(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let rooms = self.registry.unregister_session(session_id);

        let mut actions = Vec::new();
        for room_id in &rooms {
            let outcome = self.room_manager.leave(*room_id, session_id);
            if outcome.destroyed {
                actions.push(ServerAction::Log {
                    level: LogLevel::Info,
                    message: format!("room {room_id:#034x} destroyed (last participant left)"),
                });
            }
        }

        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "connection {session_id} closed: {reason}, was in {} rooms",
                rooms.len()
            ),
        });
        actions
    }

    /// Handle periodic tick: report gauges.
    fn handle_tick(&self) -> Vec<ServerAction> {
        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!(
                "tick: {} sessions, {} rooms",
                self.registry.session_count(),
                self.room_manager.room_count()
            ),
        }]
    }

    /// Build a Snapshot reply frame addressed to one session.
    ///
    /// Authority-originated frames carry sender id zero.
    fn snapshot_reply(
        &self,
        session_id: u64,
        room_id: RoomId,
        snapshot: reelsync_proto::payloads::SnapshotPayload,
    ) -> Vec<ServerAction> {
        let mut header = FrameHeader::new(EventKind::Snapshot);
        header.set_room_id(room_id);
        header.set_timestamp_ms(self.env.wall_clock_ms());

        match Payload::Snapshot(snapshot).into_frame(header) {
            Ok(frame) => vec![ServerAction::SendToSession { session_id, frame }],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode snapshot reply: {e}"),
            }],
        }
    }

    /// Build an Error reply frame addressed to one session.
    fn error_reply(
        &self,
        session_id: u64,
        room_id: RoomId,
        error: &RoomError,
    ) -> Vec<ServerAction> {
        let mut header = FrameHeader::new(EventKind::Error);
        header.set_room_id(room_id);
        header.set_timestamp_ms(self.env.wall_clock_ms());

        let payload = Payload::Error(ErrorPayload { reason: error.to_string() });
        match payload.into_frame(header) {
            Ok(frame) => vec![
                ServerAction::SendToSession { session_id, frame },
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("rejected frame from session {session_id}: {error}"),
                },
            ],
            Err(e) => vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("failed to encode error reply: {e}"),
            }],
        }
    }

    /// All sessions subscribed to a room.
    pub fn sessions_in_room(&self, room_id: RoomId) -> impl Iterator<Item = u64> + '_ {
        self.registry.sessions_in_room(room_id)
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Room exists.
    pub fn has_room(&self, room_id: RoomId) -> bool {
        self.room_manager.has_room(room_id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.room_manager.room_count()
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("session_count", &self.registry.session_count())
            .field("room_count", &self.room_manager.room_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reelsync_core::env::test_utils::MockEnv;
    use reelsync_proto::payloads::TimePayload;

    use super::*;

    const ROOM: RoomId = 0x1234_5678_90ab_cdef_1234_5678_90ab_cdef;

    fn driver() -> ServerDriver<MockEnv> {
        ServerDriver::new(MockEnv::new(), ServerConfig::default())
    }

    fn control_frame(kind: EventKind, payload: Payload, sender_id: u64) -> Frame {
        let mut header = FrameHeader::new(kind);
        header.set_room_id(ROOM);
        header.set_sender_id(sender_id);
        payload.into_frame(header).unwrap()
    }

    fn bare_frame(kind: EventKind, room_id: RoomId) -> Frame {
        let mut header = FrameHeader::new(kind);
        header.set_room_id(room_id);
        Frame::new(header, Vec::new())
    }

    fn accept(driver: &mut ServerDriver<MockEnv>, session_id: u64) {
        driver.process_event(ServerEvent::ConnectionAccepted { session_id }).unwrap();
    }

    fn join(driver: &mut ServerDriver<MockEnv>, session_id: u64) -> Vec<ServerAction> {
        driver
            .process_event(ServerEvent::FrameReceived {
                session_id,
                frame: bare_frame(EventKind::Join, ROOM),
            })
            .unwrap()
    }

    #[test]
    fn accepts_connection() {
        let mut driver = driver();
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 1 }).unwrap();

        assert_eq!(driver.connection_count(), 1);
        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Debug, .. }));
    }

    #[test]
    fn rejects_when_max_connections_exceeded() {
        let env = MockEnv::new();
        let mut driver =
            ServerDriver::new(env, ServerConfig { max_connections: 2 });

        accept(&mut driver, 1);
        accept(&mut driver, 2);
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id: 3 }).unwrap();

        assert_eq!(driver.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection { .. }));
    }

    #[test]
    fn join_creates_room_and_replies_with_snapshot() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = join(&mut driver, 1);

        assert!(driver.has_room(ROOM));
        let snapshot = actions
            .iter()
            .find_map(|a| match a {
                ServerAction::SendToSession { session_id: 1, frame } => {
                    Payload::from_frame(frame).ok()
                },
                _ => None,
            })
            .unwrap();
        match snapshot {
            Payload::Snapshot(s) => {
                assert_eq!(s.participant_count, 1);
                assert_eq!(s.video_id, None);
            },
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn control_frame_broadcasts_excluding_sender() {
        let mut driver = driver();
        accept(&mut driver, 1);
        accept(&mut driver, 2);
        join(&mut driver, 1);
        join(&mut driver, 2);

        let frame = control_frame(
            EventKind::Seek,
            Payload::Seek(TimePayload { time: 42.0 }),
            101,
        );
        let actions = driver
            .process_event(ServerEvent::FrameReceived { session_id: 1, frame: frame.clone() })
            .unwrap();

        match &actions[0] {
            ServerAction::BroadcastToRoom { room_id, frame: relayed, exclude_session } => {
                assert_eq!(*room_id, ROOM);
                assert_eq!(*exclude_session, Some(1));
                // The relayed frame is byte-identical to what was received.
                assert_eq!(relayed.encode_to_vec().unwrap(), frame.encode_to_vec().unwrap());
            },
            other => panic!("expected broadcast, got {other:?}"),
        }
    }

    #[test]
    fn control_frame_for_unknown_room_gets_error_reply() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let frame = control_frame(EventKind::Play, Payload::Play(TimePayload { time: 1.0 }), 101);
        let actions =
            driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame }).unwrap();

        let reply = actions
            .iter()
            .find_map(|a| match a {
                ServerAction::SendToSession { session_id: 1, frame } => {
                    Payload::from_frame(frame).ok()
                },
                _ => None,
            })
            .unwrap();
        assert!(matches!(reply, Payload::Error(_)));
    }

    #[test]
    fn zero_room_id_is_dropped_silently() {
        let mut driver = driver();
        accept(&mut driver, 1);

        let actions = driver
            .process_event(ServerEvent::FrameReceived {
                session_id: 1,
                frame: bare_frame(EventKind::Join, 0),
            })
            .unwrap();

        assert!(actions.is_empty());
        assert_eq!(driver.room_count(), 0);
    }

    #[test]
    fn unknown_kind_is_logged_and_connection_survives() {
        let mut driver = driver();
        accept(&mut driver, 1);
        join(&mut driver, 1);

        let mut header = FrameHeader::new(EventKind::Sync);
        header.set_room_id(ROOM);
        let mut bytes = header.to_bytes();
        // Overwrite the kind field with a value no variant maps to.
        bytes[6..8].copy_from_slice(&0x7777u16.to_be_bytes());
        let header = *FrameHeader::from_bytes(&bytes).unwrap();
        let frame = Frame::new(header, Vec::new());

        let actions =
            driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame }).unwrap();

        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Warn, .. }));
        // The session is still registered and subscribed.
        assert_eq!(driver.sessions_in_room(ROOM).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn undecodable_payload_is_dropped() {
        let mut driver = driver();
        accept(&mut driver, 1);
        join(&mut driver, 1);

        let mut header = FrameHeader::new(EventKind::Seek);
        header.set_room_id(ROOM);
        let frame = Frame::new(header, vec![0xFF, 0x00, 0xFF]);

        let actions =
            driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame }).unwrap();

        assert!(matches!(actions[0], ServerAction::Log { level: LogLevel::Warn, .. }));
        assert!(driver.has_room(ROOM));
    }

    #[test]
    fn disconnect_leaves_all_rooms() {
        let mut driver = driver();
        accept(&mut driver, 1);
        join(&mut driver, 1);
        assert!(driver.has_room(ROOM));

        driver
            .process_event(ServerEvent::ConnectionClosed {
                session_id: 1,
                reason: "peer reset".to_string(),
            })
            .unwrap();

        assert_eq!(driver.connection_count(), 0);
        assert!(!driver.has_room(ROOM));
    }

    #[test]
    fn get_current_replies_with_projected_snapshot() {
        let env = MockEnv::new();
        let mut driver = ServerDriver::new(env.clone(), ServerConfig::default());
        accept(&mut driver, 1);
        join(&mut driver, 1);

        let load = control_frame(
            EventKind::Load,
            Payload::Load(reelsync_proto::payloads::LoadPayload { video_id: "vid".into() }),
            101,
        );
        driver.process_event(ServerEvent::FrameReceived { session_id: 1, frame: load }).unwrap();

        env.advance(std::time::Duration::from_secs(10));

        let actions = driver
            .process_event(ServerEvent::FrameReceived {
                session_id: 1,
                frame: bare_frame(EventKind::GetCurrent, ROOM),
            })
            .unwrap();

        let snapshot = actions
            .iter()
            .find_map(|a| match a {
                ServerAction::SendToSession { frame, .. } => Payload::from_frame(frame).ok(),
                _ => None,
            })
            .unwrap();
        match snapshot {
            Payload::Snapshot(s) => {
                assert_eq!(s.video_id.as_deref(), Some("vid"));
                assert!(s.is_playing);
                assert!((s.time - 10.0).abs() < 1e-6);
            },
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn frame_from_unknown_session_is_an_error() {
        let mut driver = driver();
        let result = driver.process_event(ServerEvent::FrameReceived {
            session_id: 9,
            frame: bare_frame(EventKind::Join, ROOM),
        });

        assert!(matches!(result, Err(ServerError::SessionNotFound(9))));
    }
}
