//! Canonical per-room playback state.
//!
//! A `Room` stores the authoritative baseline the whole system converges
//! toward: the loaded video, a baseline position, the playing flag, and
//! the authority-clock instant of the last write. "Current position" is
//! never stored; it is projected from elapsed time on demand, which is
//! what lets a late joiner land near the correct position without a
//! per-tick broadcast.

use std::collections::HashSet;

use reelsync_proto::{Payload, payloads::SnapshotPayload};

/// Authoritative playback state for one room.
///
/// Generic over `I` (instant type) to support virtual time in tests.
///
/// # Invariants
///
/// While `is_playing`, the projected position is monotonic non-decreasing
/// between writes. Only `Load`, `Seek` and `ForceSync` may set the
/// baseline to a value not reachable by elapsed-time projection; passive
/// `Sync` writes are clamped to the current projection while playing, so
/// heartbeat jitter can never rewind the authoritative timeline.
#[derive(Debug, Clone)]
pub struct Room<I> {
    /// Loaded video source. `None` until the first `Load`.
    video_id: Option<String>,
    /// Baseline position in seconds at `last_updated`.
    base_time: f64,
    /// Whether the room timeline is advancing.
    is_playing: bool,
    /// Authority-clock instant of the last authoritative write.
    last_updated: I,
    /// Sessions currently in the room.
    participants: HashSet<u64>,
}

impl<I> Room<I>
where
    I: Copy + Ord + std::ops::Sub<Output = std::time::Duration>,
{
    /// Create an empty room. Rooms start with no video, paused at zero.
    pub fn new(now: I) -> Self {
        Self {
            video_id: None,
            base_time: 0.0,
            is_playing: false,
            last_updated: now,
            participants: HashSet::new(),
        }
    }

    /// Project the current position from elapsed time.
    pub fn projected_time(&self, now: I) -> f64 {
        if self.is_playing {
            self.base_time + (now - self.last_updated).as_secs_f64()
        } else {
            self.base_time
        }
    }

    /// Projected snapshot of the room, as answered to `Join` and
    /// `GetCurrent`.
    pub fn snapshot(&self, now: I) -> SnapshotPayload {
        SnapshotPayload {
            video_id: self.video_id.clone(),
            time: self.projected_time(now),
            is_playing: self.is_playing,
            participant_count: self.participants.len() as u32,
        }
    }

    /// Apply a validated control event to the canonical fields.
    ///
    /// Returns `true` if the payload kind mutates room state. Every
    /// mutation stamps `last_updated = now`; the sender's wire timestamp
    /// is never consulted.
    pub fn apply(&mut self, payload: &Payload, now: I) -> bool {
        match payload {
            Payload::Load(load) => {
                self.video_id = Some(load.video_id.clone());
                self.base_time = 0.0;
                self.is_playing = true;
            },
            Payload::Play(p) => {
                self.base_time = p.time;
                self.is_playing = true;
            },
            Payload::Pause(p) => {
                self.base_time = p.time;
                self.is_playing = false;
            },
            Payload::Seek(p) => {
                self.base_time = p.time;
            },
            Payload::Sync(state) => {
                let mut time = state.time;
                if self.is_playing && state.is_playing {
                    // Monotonicity clamp: a lagging heartbeat must not
                    // move the playing timeline backwards.
                    time = time.max(self.projected_time(now));
                }
                self.base_time = time;
                self.is_playing = state.is_playing;
                if let Some(video_id) = &state.video_id {
                    self.video_id = Some(video_id.clone());
                }
            },
            Payload::ForceSync(state) => {
                self.base_time = state.time;
                self.is_playing = state.is_playing;
                if let Some(video_id) = &state.video_id {
                    self.video_id = Some(video_id.clone());
                }
            },
            Payload::Join
            | Payload::Leave
            | Payload::GetCurrent
            | Payload::Snapshot(_)
            | Payload::Error(_) => return false,
        }

        self.last_updated = now;
        true
    }

    /// Add a participant session. Returns `false` if already present.
    pub fn add_participant(&mut self, session_id: u64) -> bool {
        self.participants.insert(session_id)
    }

    /// Remove a participant session. Returns `false` if absent.
    pub fn remove_participant(&mut self, session_id: u64) -> bool {
        self.participants.remove(&session_id)
    }

    /// Number of sessions in the room.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// True if the room has no participants and should be destroyed.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use proptest::prelude::*;
    use reelsync_proto::payloads::{LoadPayload, StatePayload, TimePayload};

    use super::*;

    fn instant_pair(gap: Duration) -> (Instant, Instant) {
        let t0 = Instant::now();
        (t0, t0 + gap)
    }

    #[test]
    fn paused_room_projects_exactly_the_baseline() {
        let (t0, t1) = instant_pair(Duration::from_secs(30));
        let mut room = Room::new(t0);
        room.apply(&Payload::Pause(TimePayload { time: 42.0 }), t0);

        assert_eq!(room.projected_time(t1), 42.0);
    }

    #[test]
    fn playing_room_projects_elapsed_time() {
        let (t0, t1) = instant_pair(Duration::from_millis(5000));
        let mut room = Room::new(t0);
        room.apply(&Payload::Play(TimePayload { time: 10.0 }), t0);

        let projected = room.projected_time(t1);
        assert!((projected - 15.0).abs() < 0.01, "projected {projected}, expected ~15");
    }

    #[test]
    fn load_resets_to_zero_playing() {
        let (t0, t1) = instant_pair(Duration::from_secs(1));
        let mut room = Room::new(t0);
        room.apply(&Payload::Seek(TimePayload { time: 500.0 }), t0);

        room.apply(&Payload::Load(LoadPayload { video_id: "X".to_string() }), t1);
        let snap = room.snapshot(t1);

        assert_eq!(snap.video_id.as_deref(), Some("X"));
        assert_eq!(snap.time, 0.0);
        assert!(snap.is_playing);
    }

    #[test]
    fn lagging_sync_cannot_rewind_playing_timeline() {
        let (t0, t1) = instant_pair(Duration::from_secs(10));
        let mut room = Room::new(t0);
        room.apply(&Payload::Play(TimePayload { time: 100.0 }), t0);

        // Heartbeat arrives late claiming an older position
        room.apply(
            &Payload::Sync(StatePayload { video_id: None, time: 103.0, is_playing: true }),
            t1,
        );

        // Projection at t1 was ~110; the clamp wins over the stale 103
        assert!(room.projected_time(t1) >= 109.9);
    }

    #[test]
    fn seek_may_rewind() {
        let (t0, t1) = instant_pair(Duration::from_secs(10));
        let mut room = Room::new(t0);
        room.apply(&Payload::Play(TimePayload { time: 100.0 }), t0);

        room.apply(&Payload::Seek(TimePayload { time: 5.0 }), t1);

        assert!((room.projected_time(t1) - 5.0).abs() < 0.01);
    }

    #[test]
    fn seek_preserves_play_state() {
        let t0 = Instant::now();
        let mut room = Room::new(t0);
        room.apply(&Payload::Play(TimePayload { time: 1.0 }), t0);
        room.apply(&Payload::Seek(TimePayload { time: 2.0 }), t0);
        assert!(room.snapshot(t0).is_playing);

        room.apply(&Payload::Pause(TimePayload { time: 3.0 }), t0);
        room.apply(&Payload::Seek(TimePayload { time: 4.0 }), t0);
        assert!(!room.snapshot(t0).is_playing);
    }

    #[test]
    fn non_control_payloads_do_not_mutate() {
        let t0 = Instant::now();
        let mut room = Room::new(t0);

        assert!(!room.apply(&Payload::Join, t0));
        assert!(!room.apply(&Payload::GetCurrent, t0));
        assert!(room.apply(&Payload::Play(TimePayload { time: 7.0 }), t0));
    }

    proptest! {
        /// Between writes the projection never runs backwards: constant
        /// while paused, advancing with elapsed time while playing.
        #[test]
        fn projection_is_monotone_between_writes(
            base in 0.0f64..10_000.0,
            playing in any::<bool>(),
            gaps_ms in prop::collection::vec(0u64..30_000, 1..8),
        ) {
            let t0 = Instant::now();
            let mut room = Room::new(t0);
            let payload = if playing {
                Payload::Play(TimePayload { time: base })
            } else {
                Payload::Pause(TimePayload { time: base })
            };
            room.apply(&payload, t0);

            let mut now = t0;
            let mut last = room.projected_time(now);
            prop_assert!(last >= base);
            for gap in gaps_ms {
                now += Duration::from_millis(gap);
                let projected = room.projected_time(now);
                prop_assert!(projected >= last);
                if !playing {
                    prop_assert_eq!(projected, base);
                }
                last = projected;
            }
        }

        /// Heartbeats, however stale their claimed position, never rewind
        /// a playing timeline.
        #[test]
        fn stale_heartbeats_never_rewind_playing_projection(
            base in 0.0f64..10_000.0,
            syncs in prop::collection::vec((0u64..30_000, 0.0f64..10_000.0), 1..8),
        ) {
            let t0 = Instant::now();
            let mut room = Room::new(t0);
            room.apply(&Payload::Play(TimePayload { time: base }), t0);

            let mut now = t0;
            let mut last = room.projected_time(now);
            for (gap_ms, claimed) in syncs {
                now += Duration::from_millis(gap_ms);
                let before = room.projected_time(now);
                room.apply(
                    &Payload::Sync(StatePayload {
                        video_id: None,
                        time: claimed,
                        is_playing: true,
                    }),
                    now,
                );
                let after = room.projected_time(now);
                prop_assert!(after >= before);
                prop_assert!(after >= last);
                last = after;
            }
        }
    }

    #[test]
    fn participants_drive_emptiness() {
        let mut room = Room::new(Instant::now());
        assert!(room.is_empty());

        assert!(room.add_participant(1));
        assert!(!room.add_participant(1));
        assert_eq!(room.participant_count(), 1);

        assert!(room.remove_participant(1));
        assert!(room.is_empty());
    }
}
