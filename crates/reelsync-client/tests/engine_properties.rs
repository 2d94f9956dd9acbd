//! Property-based tests for the reconciliation engine.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use reelsync_client::{
    DRIFT_THRESHOLD, Engine, EngineAction, EngineEvent, PlayerCommand, TimerKind,
};
use reelsync_core::{Environment, env::test_utils::MockEnv};
use reelsync_proto::{
    EventKind, FrameHeader, Payload,
    payloads::{StatePayload, TimePayload},
};

const ROOM: u128 = 0xABCD;
const US: u64 = 1;
const PEER: u64 = 2;

fn ready_engine() -> (MockEnv, Engine<MockEnv>) {
    let env = MockEnv::new();
    let mut engine = Engine::new(env.clone(), US, ROOM);
    let _ = engine.handle(EngineEvent::PlayerAttached);
    (env, engine)
}

fn peer_frame(payload: Payload) -> reelsync_proto::Frame {
    let mut header = FrameHeader::new(EventKind::Sync);
    header.set_room_id(ROOM);
    header.set_sender_id(PEER);
    payload.into_frame(header).unwrap()
}

fn seeks(actions: &[EngineAction]) -> Vec<f64> {
    actions
        .iter()
        .filter_map(|a| match a {
            EngineAction::Player(PlayerCommand::Seek { time }) => Some(*time),
            _ => None,
        })
        .collect()
}

proptest! {
    /// A passive sync within the drift threshold never causes a seek,
    /// regardless of position.
    #[test]
    fn sync_within_threshold_never_seeks(
        local in 0.0f64..10_000.0,
        offset in -1.4f64..1.4,
    ) {
        let (_env, mut engine) = ready_engine();
        let _ = engine.handle(EngineEvent::PositionUpdate { time: local });

        let actions = engine.handle(EngineEvent::FrameReceived(peer_frame(Payload::Sync(
            StatePayload { video_id: None, time: local + offset, is_playing: false },
        ))));

        prop_assert!(seeks(&actions).is_empty());
    }

    /// A passive sync beyond the threshold always corrects to exactly the
    /// peer's position.
    #[test]
    fn sync_beyond_threshold_corrects_exactly(
        local in 0.0f64..10_000.0,
        drift in (DRIFT_THRESHOLD + 0.001)..1_000.0,
        sign in prop::bool::ANY,
    ) {
        let (_env, mut engine) = ready_engine();
        let _ = engine.handle(EngineEvent::PositionUpdate { time: local });

        let remote = if sign { local + drift } else { (local - drift).max(0.0) };
        // Clamping at zero can land back inside the threshold.
        prop_assume!((remote - local).abs() > DRIFT_THRESHOLD);

        let actions = engine.handle(EngineEvent::FrameReceived(peer_frame(Payload::Sync(
            StatePayload { video_id: None, time: remote, is_playing: false },
        ))));

        prop_assert_eq!(seeks(&actions), vec![remote]);
        prop_assert_eq!(engine.current_time(), remote);
    }

    /// Frames stamped with our own sender id never produce actions.
    #[test]
    fn own_frames_never_produce_actions(time in 0.0f64..10_000.0) {
        let (_env, mut engine) = ready_engine();

        let mut header = FrameHeader::new(EventKind::Seek);
        header.set_room_id(ROOM);
        header.set_sender_id(US);
        let frame = Payload::Seek(TimePayload { time }).into_frame(header).unwrap();

        let actions = engine.handle(EngineEvent::FrameReceived(frame));
        prop_assert!(actions.is_empty());
    }

    /// However a scrub burst is shaped, exactly one seek frame goes out,
    /// carrying the final position.
    #[test]
    fn scrub_burst_announces_only_final_position(
        targets in prop::collection::vec(0.0f64..10_000.0, 1..10),
    ) {
        let (env, mut engine) = ready_engine();

        for &time in &targets {
            let actions = engine.handle(EngineEvent::SeekTo { time, now: env.now() });
            // Nothing goes out while the burst is still in flight.
            prop_assert!(!actions.iter().any(|a| matches!(a, EngineAction::Send(_))));
            env.advance(std::time::Duration::from_millis(100));
        }

        let actions = engine.handle(EngineEvent::TimerFired {
            kind: TimerKind::SeekDebounce,
            now: env.now(),
        });
        let frames: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                EngineAction::Send(f) => Some(f.clone()),
                _ => None,
            })
            .collect();

        prop_assert_eq!(frames.len(), 1);
        match Payload::from_frame(&frames[0]).unwrap() {
            Payload::Seek(seek) => prop_assert_eq!(seek.time, *targets.last().unwrap()),
            other => return Err(TestCaseError::fail(format!("expected seek, got {other:?}"))),
        }
    }
}
