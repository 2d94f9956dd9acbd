//! Fuzz target for the server driver event loop
//!
//! Drives arbitrary event sequences through the sans-IO server driver.
//!
//! # Strategy
//!
//! - Well-formed control frames from registered sessions
//! - Frames from sessions that were never accepted
//! - Frames for room zero and unknown rooms
//! - Garbage payload bytes under valid headers
//! - Connection churn interleaved with traffic
//!
//! # Invariants
//!
//! - The driver never panics
//! - A broadcast never targets the session it came from
//! - Registered sessions stay routable until their connection closes

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use reelsync_core::env::test_utils::MockEnv;
use reelsync_proto::{
    EventKind, Frame, FrameHeader, Payload,
    payloads::{LoadPayload, StatePayload, TimePayload},
};
use reelsync_server::{DriverConfig, ServerAction, ServerDriver, ServerEvent};

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    seed: u64,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Accept { session: u8 },
    Close { session: u8 },
    Join { session: u8, room: u8 },
    Control { session: u8, room: u8, action: ControlKind },
    Garbage { session: u8, room: u8, kind: u16, payload: Vec<u8> },
    Tick,
}

#[derive(Debug, Clone, Arbitrary)]
enum ControlKind {
    Load { video: u8 },
    Play { time: u32 },
    Pause { time: u32 },
    Seek { time: u32 },
    Sync { time: u32, playing: bool },
}

fuzz_target!(|scenario: Scenario| {
    let env = MockEnv::with_seed(scenario.seed | 1);
    let mut driver: ServerDriver<MockEnv> = ServerDriver::new(env, DriverConfig::default());

    for step in scenario.steps {
        let (event, sender) = match step {
            Step::Accept { session } => {
                (ServerEvent::ConnectionAccepted { session_id: u64::from(session) }, None)
            },
            Step::Close { session } => (
                ServerEvent::ConnectionClosed {
                    session_id: u64::from(session),
                    reason: "fuzz".to_string(),
                },
                None,
            ),
            Step::Join { session, room } => {
                let Ok(frame) = control_frame(u64::from(session), u128::from(room), None) else {
                    continue;
                };
                (
                    ServerEvent::FrameReceived { session_id: u64::from(session), frame },
                    Some(u64::from(session)),
                )
            },
            Step::Control { session, room, action } => {
                let Ok(frame) = control_frame(u64::from(session), u128::from(room), Some(action))
                else {
                    continue;
                };
                (
                    ServerEvent::FrameReceived { session_id: u64::from(session), frame },
                    Some(u64::from(session)),
                )
            },
            Step::Garbage { session, room, kind, payload } => {
                let known = EventKind::from_u16(kind);
                let mut header = FrameHeader::new(known.unwrap_or(EventKind::Sync));
                header.set_room_id(u128::from(room));
                header.set_sender_id(u64::from(session));
                let frame = Frame::new(header, Bytes::from(payload));
                (
                    ServerEvent::FrameReceived { session_id: u64::from(session), frame },
                    Some(u64::from(session)),
                )
            },
            Step::Tick => (ServerEvent::Tick, None),
        };

        // Errors are expected for unknown sessions; panics never are.
        let Ok(actions) = driver.process_event(event) else {
            continue;
        };

        for action in actions {
            if let ServerAction::BroadcastToRoom { exclude_session, .. } = &action {
                if let (Some(excluded), Some(from)) = (exclude_session, sender) {
                    assert_eq!(*excluded, from, "broadcast excluded the wrong session");
                }
            }
        }
    }
});

fn control_frame(
    session: u64,
    room: u128,
    action: Option<ControlKind>,
) -> Result<Frame, reelsync_proto::ProtocolError> {
    let payload = match action {
        None => Payload::Join,
        Some(ControlKind::Load { video }) => {
            Payload::Load(LoadPayload { video_id: format!("video-{video}") })
        },
        Some(ControlKind::Play { time }) => {
            Payload::Play(TimePayload { time: f64::from(time) })
        },
        Some(ControlKind::Pause { time }) => {
            Payload::Pause(TimePayload { time: f64::from(time) })
        },
        Some(ControlKind::Seek { time }) => {
            Payload::Seek(TimePayload { time: f64::from(time) })
        },
        Some(ControlKind::Sync { time, playing }) => Payload::Sync(state(time, playing)),
    };

    let mut header = FrameHeader::new(payload.kind());
    header.set_room_id(room);
    header.set_sender_id(session);
    payload.into_frame(header)
}

fn state(time: u32, is_playing: bool) -> StatePayload {
    StatePayload { video_id: Some("video".to_string()), time: f64::from(time), is_playing }
}
