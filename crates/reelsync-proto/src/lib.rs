//! ReelSync wire protocol.
//!
//! Defines the message catalog between clients and the room-state
//! authority: a fixed 48-byte binary frame header (Big Endian, parsed
//! zero-copy) followed by a CBOR payload.
//!
//! The protocol is fire-and-forget and at-most-once. Ordering is
//! guaranteed only within one event kind on one connection; every consumer
//! is written to be idempotent and convergent under cross-kind reordering.

mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::Payload;

/// ALPN protocol identifier for QUIC transport negotiation.
pub const ALPN_PROTOCOL: &[u8] = b"reelsync";

/// Room identifier. Zero means "missing"; such frames are dropped.
pub type RoomId = u128;

/// Stable client identifier. Zero is reserved for the authority.
pub type ClientId = u64;

/// Wire event kinds.
///
/// Room-scoped control traffic (`Load` through `ForceSync`) is validated
/// and relayed by the authority; `Join`/`GetCurrent` are answered with a
/// `Snapshot` to the sender only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventKind {
    /// Enter a room, creating it if absent.
    Join = 0x0001,
    /// Leave a room.
    Leave = 0x0002,

    /// Reset the room to a new video source.
    Load = 0x0010,
    /// Explicit resume intent.
    Play = 0x0011,
    /// Explicit pause intent.
    Pause = 0x0012,
    /// Explicit position jump.
    Seek = 0x0013,
    /// Passive heartbeat.
    Sync = 0x0014,
    /// Unconditional convergence broadcast.
    ForceSync = 0x0015,

    /// Request the authority's projected snapshot.
    GetCurrent = 0x0020,
    /// Authority's projected snapshot reply.
    Snapshot = 0x0021,

    /// Benign error reply to the sender.
    Error = 0x00FF,
}

impl EventKind {
    /// Convert to the wire representation.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse from the wire representation. `None` if unrecognized.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Join),
            0x0002 => Some(Self::Leave),
            0x0010 => Some(Self::Load),
            0x0011 => Some(Self::Play),
            0x0012 => Some(Self::Pause),
            0x0013 => Some(Self::Seek),
            0x0014 => Some(Self::Sync),
            0x0015 => Some(Self::ForceSync),
            0x0020 => Some(Self::GetCurrent),
            0x0021 => Some(Self::Snapshot),
            0x00FF => Some(Self::Error),
            _ => None,
        }
    }

    /// True for room control events the authority mutates state for and
    /// relays to peers (`Load`, `Play`, `Pause`, `Seek`, `Sync`,
    /// `ForceSync`).
    #[must_use]
    pub fn is_room_control(self) -> bool {
        matches!(
            self,
            Self::Load | Self::Play | Self::Pause | Self::Seek | Self::Sync | Self::ForceSync
        )
    }
}
