//! Frame header with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 48-byte structure serialized as raw binary
//! (Big Endian). The authority can route a frame to its room touching only
//! these bytes, without deserializing the CBOR payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    EventKind,
    errors::{ProtocolError, Result},
};

/// Fixed 48-byte frame header (Big Endian network byte order).
///
/// Fields are stored as raw byte arrays to avoid alignment issues. The
/// `#[repr(C, packed)]` layout with zerocopy traits means every 48-byte
/// pattern is a structurally valid header, so casting untrusted network
/// bytes cannot cause undefined behavior. Semantic validation (magic,
/// version, size limits) happens in [`FrameHeader::from_bytes`].
///
/// # Timestamp semantics
///
/// `timestamp_ms` is always the sender's wall-clock send time in Unix
/// milliseconds. The authority relays it verbatim and never uses it for
/// position projection; projection is computed purely from the authority's
/// own monotonic clock. Peer clocks never need to agree.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (8 bytes: 0-7)
    magic: [u8; 4],           // 0x5253594E ("RSYN" in ASCII)
    version: u8,              // 0x01
    flags: u8,                // reserved, must be zero
    pub(crate) kind: [u8; 2], // u16 event kind

    // Payload metadata (4 bytes: 8-11)
    pub(crate) payload_size: [u8; 4], // u32 payload length

    // Routing context (24 bytes: 12-35)
    room_id: [u8; 16],  // 128-bit room identifier (0 = missing)
    sender_id: [u8; 8], // u64 stable client identifier (0 = authority)

    // Sender send time (8 bytes: 36-43)
    timestamp_ms: [u8; 8], // u64 Unix milliseconds, sender-stamped

    // Reserved (4 bytes: 44-47)
    reserved: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header (48 bytes).
    pub const SIZE: usize = 48;

    /// Magic number: "RSYN" in ASCII.
    pub const MAGIC: u32 = 0x5253_594E;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (64 KB).
    ///
    /// Payloads carry video ids and a handful of scalars; anything larger
    /// is garbage and is rejected before allocation.
    pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024;

    /// Create a new header with the specified event kind.
    ///
    /// All routing fields start zeroed; callers fill them via setters.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            kind: kind.to_u16().to_be_bytes(),
            payload_size: [0; 4],
            room_id: [0; 16],
            sender_id: [0; 8],
            timestamp_ms: [0; 8],
            reserved: [0; 4],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// Validates cheapest-to-check properties first (size, magic) before
    /// version and payload size, failing fast on garbage data.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if the buffer is under 48 bytes
    /// - [`ProtocolError::InvalidMagic`] on a bad magic number
    /// - [`ProtocolError::UnsupportedVersion`] on an unknown version
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed size exceeds the
    ///   limit
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol magic number.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Event kind as raw u16.
    #[must_use]
    pub fn kind(&self) -> u16 {
        u16::from_be_bytes(self.kind)
    }

    /// Event kind as enum. `None` if unrecognized.
    #[must_use]
    pub fn kind_enum(&self) -> Option<EventKind> {
        EventKind::from_u16(self.kind())
    }

    /// 128-bit room identifier. Zero means "missing"; such frames are
    /// dropped silently by the authority.
    #[must_use]
    pub fn room_id(&self) -> u128 {
        u128::from_be_bytes(self.room_id)
    }

    /// Stable sender identifier. Zero is reserved for the authority.
    #[must_use]
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Sender wall-clock send time in Unix milliseconds.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        u64::from_be_bytes(self.timestamp_ms)
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Update the room identifier.
    pub fn set_room_id(&mut self, room_id: u128) {
        self.room_id = room_id.to_be_bytes();
    }

    /// Update the sender identifier.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Set the sender send-time stamp.
    pub fn set_timestamp_ms(&mut self, timestamp_ms: u64) {
        self.timestamp_ms = timestamp_ms.to_be_bytes();
    }

    /// Set the payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("kind", &format!("{:#06x}", self.kind()))
            .field("room_id", &format!("{:#034x}", self.room_id()))
            .field("sender_id", &self.sender_id())
            .field("timestamp_ms", &self.timestamp_ms())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}
