//! CBOR-encoded event payloads.
//!
//! Frame headers are raw binary for routing speed; payloads use CBOR for
//! type safety and forward compatibility. The event kind in the header
//! determines the payload type, so only the inner struct content is
//! serialized (no variant tag in CBOR) — an attacker cannot send a
//! mismatched kind/payload pair that decodes as something else.
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one [`EventKind`] (enforced by
//! match exhaustiveness). Round-trip encoding must produce an equivalent
//! value.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    EventKind, Frame, FrameHeader,
    errors::{ProtocolError, Result},
};

/// New-source announcement. Resets the room to `video_id`, time 0, playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPayload {
    /// Identifier of the video source to load.
    pub video_id: String,
}

/// Explicit play/pause/seek intent carrying the sender's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePayload {
    /// Playback position in seconds.
    pub time: f64,
}

/// Full playback state, used by passive heartbeats and forced convergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Video the sender believes is loaded. `None` before any load.
    pub video_id: Option<String>,
    /// Playback position in seconds.
    pub time: f64,
    /// Whether the sender's player is playing.
    pub is_playing: bool,
}

/// Authority's projected room snapshot, answered to `Join` and
/// `GetCurrent` senders only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Currently loaded video, if any.
    pub video_id: Option<String>,
    /// Projected playback position in seconds.
    pub time: f64,
    /// Whether the room is playing.
    pub is_playing: bool,
    /// Number of participants currently in the room.
    pub participant_count: u32,
}

/// Benign error answered only to the sender (e.g. unknown room).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable reason.
    pub reason: String,
}

/// All possible frame payloads.
///
/// The payload type is determined by the [`EventKind`] in the frame
/// header. `Join`, `Leave` and `GetCurrent` carry no payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Enter a room (creates it if absent). Answered with a snapshot.
    Join,
    /// Leave a room (destroys it when empty).
    Leave,
    /// Reset the room to a new source.
    Load(LoadPayload),
    /// Explicit resume intent.
    Play(TimePayload),
    /// Explicit pause intent.
    Pause(TimePayload),
    /// Explicit position jump, unconditional at receivers.
    Seek(TimePayload),
    /// Passive heartbeat, thresholded correction at receivers.
    Sync(StatePayload),
    /// Unconditional convergence broadcast.
    ForceSync(StatePayload),
    /// Request the authority's projected snapshot.
    GetCurrent,
    /// Authority's projected snapshot reply.
    Snapshot(SnapshotPayload),
    /// Benign error reply.
    Error(ErrorPayload),
}

impl Payload {
    /// Event kind corresponding to this payload variant.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Join => EventKind::Join,
            Self::Leave => EventKind::Leave,
            Self::Load(_) => EventKind::Load,
            Self::Play(_) => EventKind::Play,
            Self::Pause(_) => EventKind::Pause,
            Self::Seek(_) => EventKind::Seek,
            Self::Sync(_) => EventKind::Sync,
            Self::ForceSync(_) => EventKind::ForceSync,
            Self::GetCurrent => EventKind::GetCurrent,
            Self::Snapshot(_) => EventKind::Snapshot,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Encode the payload content to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
            let mut buf = Vec::new();
            ciborium::ser::into_writer(value, &mut buf)
                .map_err(|e| ProtocolError::PayloadEncode(e.to_string()))?;
            Ok(buf)
        }

        match self {
            Self::Join | Self::Leave | Self::GetCurrent => Ok(Vec::new()),
            Self::Load(p) => to_cbor(p),
            Self::Play(p) | Self::Pause(p) | Self::Seek(p) => to_cbor(p),
            Self::Sync(p) | Self::ForceSync(p) => to_cbor(p),
            Self::Snapshot(p) => to_cbor(p),
            Self::Error(p) => to_cbor(p),
        }
    }

    /// Decode payload bytes according to the event kind.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadDecode`] if the bytes are not valid CBOR for
    /// the kind's payload type.
    pub fn decode(kind: EventKind, bytes: &[u8]) -> Result<Self> {
        fn from_cbor<T: for<'de> Deserialize<'de>>(kind: EventKind, bytes: &[u8]) -> Result<T> {
            ciborium::de::from_reader(bytes)
                .map_err(|e| ProtocolError::PayloadDecode { kind, reason: e.to_string() })
        }

        Ok(match kind {
            EventKind::Join => Self::Join,
            EventKind::Leave => Self::Leave,
            EventKind::GetCurrent => Self::GetCurrent,
            EventKind::Load => Self::Load(from_cbor(kind, bytes)?),
            EventKind::Play => Self::Play(from_cbor(kind, bytes)?),
            EventKind::Pause => Self::Pause(from_cbor(kind, bytes)?),
            EventKind::Seek => Self::Seek(from_cbor(kind, bytes)?),
            EventKind::Sync => Self::Sync(from_cbor(kind, bytes)?),
            EventKind::ForceSync => Self::ForceSync(from_cbor(kind, bytes)?),
            EventKind::Snapshot => Self::Snapshot(from_cbor(kind, bytes)?),
            EventKind::Error => Self::Error(from_cbor(kind, bytes)?),
        })
    }

    /// Build a frame from this payload, overriding the header's kind and
    /// payload size to match.
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let bytes = self.encode()?;
        header.kind = self.kind().to_u16().to_be_bytes();
        Ok(Frame::new(header, Bytes::from(bytes)))
    }

    /// Decode the typed payload out of a frame.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::UnknownKind`] if the header kind is unrecognized;
    /// otherwise decode errors from [`Payload::decode`].
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let kind = frame
            .header
            .kind_enum()
            .ok_or(ProtocolError::UnknownKind(frame.header.kind()))?;
        Self::decode(kind, &frame.payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn state_payload_round_trip() {
        let original = StatePayload {
            video_id: Some("dQw4w9WgXcQ".to_string()),
            time: 123.456,
            is_playing: true,
        };

        let bytes = Payload::Sync(original.clone()).encode().unwrap();
        let decoded = Payload::decode(EventKind::Sync, &bytes).unwrap();

        assert_eq!(decoded, Payload::Sync(original));
    }

    #[test]
    fn empty_kinds_encode_to_no_bytes() {
        assert!(Payload::Join.encode().unwrap().is_empty());
        assert!(Payload::Leave.encode().unwrap().is_empty());
        assert!(Payload::GetCurrent.encode().unwrap().is_empty());
    }

    #[test]
    fn into_frame_sets_matching_kind() {
        let header = FrameHeader::new(EventKind::Join); // wrong on purpose
        let frame = Payload::Seek(TimePayload { time: 30.0 }).into_frame(header).unwrap();

        assert_eq!(frame.header.kind_enum(), Some(EventKind::Seek));
        assert_eq!(frame.header.payload_size() as usize, frame.payload.len());
    }

    #[test]
    fn from_frame_round_trip() {
        let payload = Payload::Snapshot(SnapshotPayload {
            video_id: Some("abc".to_string()),
            time: 15.0,
            is_playing: true,
            participant_count: 3,
        });

        let frame = payload.clone().into_frame(FrameHeader::new(EventKind::Snapshot)).unwrap();
        assert_eq!(Payload::from_frame(&frame).unwrap(), payload);
    }

    #[test]
    fn decode_garbage_fails_cleanly() {
        let result = Payload::decode(EventKind::Load, &[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::PayloadDecode { .. })));
    }
}
