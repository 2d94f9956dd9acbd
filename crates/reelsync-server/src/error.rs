//! Server error types.

use reelsync_proto::ProtocolError;

use crate::room_manager::RoomError;

/// Errors produced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration is invalid (bad address, unreadable cert/key).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (bind, TLS, stream I/O).
    #[error("transport error: {0}")]
    Transport(String),

    /// Frame could not be decoded or violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Frame arrived for a session the driver does not know.
    #[error("session not found: {0}")]
    SessionNotFound(u64),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}
