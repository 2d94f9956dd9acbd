//! Fuzz target for Payload::from_frame
//!
//! This fuzzer tests payload deserialization (CBOR decoding) with:
//! - Malformed CBOR data
//! - Type confusion attacks (wrong payload type for event kind)
//! - Oversized strings or collections
//! - Nested structures exceeding depth limits
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use reelsync_proto::{EventKind, Frame, FrameHeader, Payload};

fuzz_target!(|data: &[u8]| {
    // A valid frame header is needed to test payload decoding;
    // try every event kind to exercise each payload type
    let kinds = [
        EventKind::Join,
        EventKind::Leave,
        EventKind::Load,
        EventKind::Play,
        EventKind::Pause,
        EventKind::Seek,
        EventKind::Sync,
        EventKind::ForceSync,
        EventKind::GetCurrent,
        EventKind::Snapshot,
        EventKind::Error,
    ];

    for kind in kinds {
        let mut header = FrameHeader::new(kind);
        header.set_room_id(1);
        header.set_sender_id(1);

        let frame = Frame::new(header, Bytes::copy_from_slice(data));

        // Attempt to deserialize the payload
        // This should never panic, only return Err for invalid CBOR
        let _ = Payload::from_frame(&frame);
    }
});
