//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet: a 48-byte raw binary header
//! followed by a variable-length CBOR payload. It holds raw payload bytes,
//! not the `Payload` enum, so the authority can route frames without
//! deserializing them.

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame.
///
/// Layout on the wire: `[FrameHeader: 48 bytes] + [payload: variable]`.
///
/// # Invariants
///
/// - `payload.len()` always matches `header.payload_size()`. Enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`];
///   [`Frame::encode`] is the enforcement point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (48 bytes).
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic `payload_size` calculation.
    ///
    /// The header field is set from the actual payload length, so a frame
    /// with mismatched header and payload sizes cannot be constructed.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // Bytes is bounded by isize::MAX and the protocol limit is 64 KB,
        // so the length always fits in u32.
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        header.payload_size = payload_len.to_be_bytes();

        Self { header, payload }
    }

    /// Encode the frame into a buffer.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds the 64 KB
    /// protocol limit.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Encode the frame into a fresh `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(FrameHeader::SIZE + self.payload.len());
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a frame from a byte buffer.
    ///
    /// # Errors
    ///
    /// Propagates header validation errors; additionally returns
    /// [`ProtocolError::PayloadSizeMismatch`] if the buffer does not carry
    /// exactly the bytes the header claims.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;

        let claimed = header.payload_size() as usize;
        let actual = bytes.len() - FrameHeader::SIZE;
        if claimed != actual {
            return Err(ProtocolError::PayloadSizeMismatch { claimed, actual });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..]);

        Ok(Self { header, payload })
    }
}
