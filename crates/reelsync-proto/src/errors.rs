//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is shorter than the fixed header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum required length.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Magic number does not match the protocol.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Protocol version is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the protocol size limit.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size.
        size: usize,
        /// Protocol limit.
        max: usize,
    },

    /// Header claims a different payload size than the buffer carries.
    #[error("payload size mismatch: header claims {claimed}, buffer has {actual}")]
    PayloadSizeMismatch {
        /// Size from the header field.
        claimed: usize,
        /// Bytes actually present after the header.
        actual: usize,
    },

    /// Event kind is not recognized.
    #[error("unknown event kind: {0:#06x}")]
    UnknownKind(u16),

    /// CBOR payload could not be decoded for the frame's kind.
    #[error("payload decode failed for {kind:?}: {reason}")]
    PayloadDecode {
        /// Event kind the payload was decoded as.
        kind: crate::EventKind,
        /// Decoder error text.
        reason: String,
    },

    /// CBOR payload could not be encoded.
    #[error("payload encode failed: {0}")]
    PayloadEncode(String),
}
