//! Client reconciliation engine.
//!
//! The `Engine` is a sans-IO state machine that keeps a local player
//! converged on the room's shared playback state. The caller feeds it
//! [`EngineEvent`]s (inbound frames, player callbacks, user intents,
//! timers) and executes the [`EngineAction`]s it returns.
//!
//! Convergence is best-effort and self-healing: any single lost or
//! misapplied correction is repaired by the next heartbeat cycle, so no
//! individual failure is fatal.

use std::time::Duration;

use reelsync_core::Environment;
use reelsync_proto::{
    ClientId, EventKind, Frame, FrameHeader, Payload, RoomId,
    payloads::{LoadPayload, SnapshotPayload, StatePayload, TimePayload},
};

use crate::event::{EngineAction, EngineEvent, PlaybackState, PlayerCommand, TimerKind};

/// Positional drift tolerated before a corrective seek, in seconds.
///
/// Tighter than human perception of sync (~2s) but loose enough that
/// network jitter on heartbeats does not cause seek thrashing.
pub const DRIFT_THRESHOLD: f64 = 1.5;

/// Interval between passive `Sync` heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Interval between unconditional `ForceSync` broadcasts.
pub const FORCE_SYNC_INTERVAL: Duration = Duration::from_secs(15);

/// Quiet period collapsing a scrub burst into a single `Seek` frame.
pub const SEEK_DEBOUNCE: Duration = Duration::from_millis(300);

/// Grace period after a correction during which player events and inbound
/// `Sync` frames are not treated as intent.
pub const SEEK_SETTLE: Duration = Duration::from_millis(500);

/// How long to wait for a `Snapshot` reply before falling back to local
/// state.
pub const SNAPSHOT_WAIT: Duration = Duration::from_secs(1);

/// Maximum frames buffered while no player is attached.
const MAX_BUFFERED_FRAMES: usize = 64;

/// Reconciliation phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineState<I = std::time::Instant> {
    /// No controllable player yet; inbound frames are buffered.
    Uninitialized,
    /// Player attached, tracking the room.
    Ready,
    /// A correction or local scrub is in flight; inbound `Sync` frames
    /// and player echoes are suppressed until it settles.
    Seeking {
        /// When the seek began.
        since: I,
    },
    /// Host is suspended (tab hidden, device asleep).
    Suspended {
        /// Playback position at suspension.
        time: f64,
        /// Whether playback was running at suspension.
        is_playing: bool,
        /// Wall clock at suspension, for elapsed-time projection on
        /// resume.
        at_wall_ms: u64,
    },
}

/// Sans-IO reconciliation engine for one room membership.
pub struct Engine<E: Environment> {
    /// Environment for time.
    env: E,
    /// Stable identifier stamped on every outbound frame; inbound frames
    /// carrying it are our own echoes and are dropped.
    client_id: ClientId,
    /// Room this engine tracks.
    room_id: RoomId,
    /// Current reconciliation phase.
    state: EngineState<E::Instant>,
    /// Last known video source.
    video_id: Option<String>,
    /// Expected playback flag. Player state changes matching it are
    /// echoes of our own commands; mismatches are user intent.
    local_is_playing: bool,
    /// Last known playback position in seconds.
    local_time: f64,
    /// Latest scrub target not yet announced to the room.
    pending_seek: Option<f64>,
    /// A `Snapshot` reply is outstanding.
    awaiting_snapshot: bool,
    /// Projected state to apply if the post-resume snapshot never comes.
    resume_fallback: Option<(f64, bool)>,
    /// Transport is up; outbound frames are suppressed when it is not.
    connected: bool,
    /// Frames received before a player attached.
    buffered: Vec<Frame>,
}

impl<E: Environment> Engine<E> {
    /// Create an engine for one room membership.
    ///
    /// The engine starts `Uninitialized` and joins the room when the
    /// caller signals [`EngineEvent::PlayerAttached`].
    pub fn new(env: E, client_id: ClientId, room_id: RoomId) -> Self {
        Self {
            env,
            client_id,
            room_id,
            state: EngineState::Uninitialized,
            video_id: None,
            local_is_playing: false,
            local_time: 0.0,
            pending_seek: None,
            awaiting_snapshot: false,
            resume_fallback: None,
            connected: true,
            buffered: Vec::new(),
        }
    }

    /// Stable client identifier stamped on outbound frames.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Room this engine tracks.
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Current reconciliation phase.
    pub fn state(&self) -> &EngineState<E::Instant> {
        &self.state
    }

    /// Last known video source.
    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Expected playback flag.
    pub fn is_playing(&self) -> bool {
        self.local_is_playing
    }

    /// Last known playback position in seconds.
    pub fn current_time(&self) -> f64 {
        self.local_time
    }

    /// Whether the transport is believed up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Process an event and return the actions to execute.
    ///
    /// Never fails: malformed frames and player failures degrade to log
    /// actions, keeping the session alive.
    pub fn handle(&mut self, event: EngineEvent<E::Instant>) -> Vec<EngineAction> {
        match event {
            EngineEvent::PlayerAttached => self.handle_player_attached(),
            EngineEvent::FrameReceived(frame) => self.handle_frame(frame),
            EngineEvent::LoadVideo { video_id } => self.handle_local_load(video_id),
            EngineEvent::Play => self.handle_local_play(),
            EngineEvent::Pause => self.handle_local_pause(),
            EngineEvent::SeekTo { time, now } => self.handle_local_seek(time, now),
            EngineEvent::SynchronizeNow => self.handle_synchronize_now(),
            EngineEvent::PlayerStateChanged(state) => self.handle_player_state(state),
            EngineEvent::PositionUpdate { time } => self.handle_position(time),
            EngineEvent::PlayerCommandFailed { command, reason } => {
                self.handle_player_failure(&command, &reason)
            },
            EngineEvent::TimerFired { kind, now } => self.handle_timer(kind, now),
            EngineEvent::Suspended { now: _ } => self.handle_suspended(),
            EngineEvent::Resumed { now } => self.handle_resumed(now),
            EngineEvent::TransportUp => self.handle_transport_up(),
            EngineEvent::TransportDown => self.handle_transport_down(),
        }
    }

    fn handle_player_attached(&mut self) -> Vec<EngineAction> {
        if !matches!(self.state, EngineState::Uninitialized) {
            return vec![EngineAction::Log {
                message: "player attached twice, ignoring".to_string(),
            }];
        }

        self.state = EngineState::Ready;
        let mut actions = self.join_room();

        // Replay frames that arrived before the player was controllable.
        let buffered = std::mem::take(&mut self.buffered);
        for frame in buffered {
            actions.extend(self.handle_frame(frame));
        }

        actions
    }

    /// Announce membership and arm the periodic timers.
    fn join_room(&mut self) -> Vec<EngineAction> {
        self.awaiting_snapshot = true;

        let mut actions = self.emit(Payload::Join);
        actions.push(EngineAction::StartTimer {
            kind: TimerKind::SnapshotWait,
            duration: SNAPSHOT_WAIT,
            recurring: false,
        });
        actions.push(EngineAction::StartTimer {
            kind: TimerKind::Heartbeat,
            duration: HEARTBEAT_INTERVAL,
            recurring: true,
        });
        actions.push(EngineAction::StartTimer {
            kind: TimerKind::ForceSync,
            duration: FORCE_SYNC_INTERVAL,
            recurring: true,
        });
        actions
    }

    fn handle_frame(&mut self, frame: Frame) -> Vec<EngineAction> {
        // Our own frames come back via reconnected sessions; identity, not
        // timing, decides what is an echo.
        if frame.header.sender_id() == self.client_id {
            return Vec::new();
        }
        if frame.header.room_id() != self.room_id {
            return Vec::new();
        }

        if matches!(self.state, EngineState::Uninitialized) {
            if self.buffered.len() >= MAX_BUFFERED_FRAMES {
                self.buffered.remove(0);
            }
            self.buffered.push(frame);
            return Vec::new();
        }

        // The player surface is hidden while suspended; applying
        // corrections would clobber the suspend record. The resume
        // snapshot repairs whatever we miss here.
        if matches!(self.state, EngineState::Suspended { .. }) {
            return Vec::new();
        }

        let payload = match Payload::from_frame(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                return vec![EngineAction::Log {
                    message: format!("dropping undecodable frame: {e}"),
                }];
            },
        };

        match payload {
            Payload::Snapshot(snapshot) => self.apply_snapshot(&snapshot),
            Payload::Load(load) => self.apply_remote_load(load),
            Payload::Play(state) => self.apply_remote_transition(&state, PlaybackState::Playing),
            Payload::Pause(state) => self.apply_remote_transition(&state, PlaybackState::Paused),
            Payload::Seek(seek) => self.apply_remote_seek(&seek),
            Payload::ForceSync(state) => self.apply_force_sync(&state),
            Payload::Sync(state) => self.apply_passive_sync(&state),
            Payload::Error(e) => {
                vec![EngineAction::Log { message: format!("authority rejected a frame: {}", e.reason) }]
            },
            other => vec![EngineAction::Log {
                message: format!("ignoring unexpected {:?} frame", other.kind()),
            }],
        }
    }

    /// Apply an authority snapshot unconditionally.
    fn apply_snapshot(&mut self, snapshot: &SnapshotPayload) -> Vec<EngineAction> {
        self.awaiting_snapshot = false;
        self.resume_fallback = None;

        let mut actions = vec![EngineAction::CancelTimer { kind: TimerKind::SnapshotWait }];

        if let Some(video_id) = &snapshot.video_id {
            if self.video_id.as_deref() != Some(video_id) {
                self.video_id = Some(video_id.clone());
                actions.push(EngineAction::Player(PlayerCommand::Load {
                    video_id: video_id.clone(),
                }));
            }
        }

        self.local_time = snapshot.time;
        actions.push(EngineAction::Player(PlayerCommand::Seek { time: snapshot.time }));

        // Unconditional: the engine's expectation can be stale after a
        // resume (the real player froze while we still believed it was
        // playing), and the command is idempotent at the player.
        self.local_is_playing = snapshot.is_playing;
        actions.push(EngineAction::Player(if snapshot.is_playing {
            PlayerCommand::Play
        } else {
            PlayerCommand::Pause
        }));

        self.enter_seeking(&mut actions);
        actions
    }

    /// A peer loaded a new video: reset to position zero, playing.
    fn apply_remote_load(&mut self, load: LoadPayload) -> Vec<EngineAction> {
        self.local_time = 0.0;
        let mut actions =
            vec![EngineAction::Player(PlayerCommand::Load { video_id: load.video_id.clone() })];
        self.video_id = Some(load.video_id);

        if !self.local_is_playing {
            self.local_is_playing = true;
            actions.push(EngineAction::Player(PlayerCommand::Play));
        }

        self.enter_seeking(&mut actions);
        actions
    }

    /// A peer explicitly played or paused.
    ///
    /// The transition always applies; the positional correction only when
    /// drift exceeds the threshold. A `Pause { time: 42 }` against a local
    /// position of 50 both pauses and rewinds.
    fn apply_remote_transition(
        &mut self,
        state: &TimePayload,
        target: PlaybackState,
    ) -> Vec<EngineAction> {
        let mut actions = Vec::new();

        if (self.local_time - state.time).abs() > DRIFT_THRESHOLD {
            self.local_time = state.time;
            actions.push(EngineAction::Player(PlayerCommand::Seek { time: state.time }));
            self.enter_seeking(&mut actions);
        }

        let playing = target == PlaybackState::Playing;
        if self.local_is_playing != playing {
            self.local_is_playing = playing;
            actions.push(EngineAction::Player(if playing {
                PlayerCommand::Play
            } else {
                PlayerCommand::Pause
            }));
        }

        actions
    }

    /// A peer explicitly jumped; apply unconditionally.
    fn apply_remote_seek(&mut self, seek: &TimePayload) -> Vec<EngineAction> {
        self.local_time = seek.time;
        let mut actions = vec![EngineAction::Player(PlayerCommand::Seek { time: seek.time })];
        self.enter_seeking(&mut actions);
        actions
    }

    /// Unconditional convergence: adopt the peer's full state.
    fn apply_force_sync(&mut self, state: &StatePayload) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        self.sync_video(state, &mut actions);

        self.local_time = state.time;
        actions.push(EngineAction::Player(PlayerCommand::Seek { time: state.time }));

        if self.local_is_playing != state.is_playing {
            self.local_is_playing = state.is_playing;
            actions.push(EngineAction::Player(if state.is_playing {
                PlayerCommand::Play
            } else {
                PlayerCommand::Pause
            }));
        }

        self.enter_seeking(&mut actions);
        actions
    }

    /// Passive heartbeat from a peer: correct only on real drift.
    ///
    /// Ignored entirely while a seek is settling or the host is suspended;
    /// a stale correction applied mid-seek causes visible rubber-banding.
    fn apply_passive_sync(&mut self, state: &StatePayload) -> Vec<EngineAction> {
        if !matches!(self.state, EngineState::Ready) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        self.sync_video(state, &mut actions);

        if (self.local_time - state.time).abs() > DRIFT_THRESHOLD {
            self.local_time = state.time;
            actions.push(EngineAction::Player(PlayerCommand::Seek { time: state.time }));
            self.enter_seeking(&mut actions);
        }

        if self.local_is_playing != state.is_playing {
            self.local_is_playing = state.is_playing;
            actions.push(EngineAction::Player(if state.is_playing {
                PlayerCommand::Play
            } else {
                PlayerCommand::Pause
            }));
        }

        actions
    }

    /// Load the peer's video if it differs from ours.
    fn sync_video(&mut self, state: &StatePayload, actions: &mut Vec<EngineAction>) {
        if let Some(video_id) = &state.video_id {
            if self.video_id.as_deref() != Some(video_id) {
                self.video_id = Some(video_id.clone());
                actions.push(EngineAction::Player(PlayerCommand::Load {
                    video_id: video_id.clone(),
                }));
            }
        }
    }

    fn handle_local_load(&mut self, video_id: String) -> Vec<EngineAction> {
        self.video_id = Some(video_id.clone());
        self.local_time = 0.0;
        self.local_is_playing = true;

        // A load resets position; a scrub still waiting behind the
        // debounce is stale and must never fire afterwards.
        self.pending_seek = None;

        let mut actions = vec![
            EngineAction::CancelTimer { kind: TimerKind::SeekDebounce },
            EngineAction::Player(PlayerCommand::Load { video_id: video_id.clone() }),
        ];
        actions.push(EngineAction::Player(PlayerCommand::Play));
        actions.extend(self.emit(Payload::Load(LoadPayload { video_id })));
        actions
    }

    fn handle_local_play(&mut self) -> Vec<EngineAction> {
        let mut actions = self.flush_pending_seek();
        self.local_is_playing = true;
        actions.push(EngineAction::Player(PlayerCommand::Play));
        actions.extend(self.emit(Payload::Play(TimePayload { time: self.local_time })));
        actions
    }

    fn handle_local_pause(&mut self) -> Vec<EngineAction> {
        let mut actions = self.flush_pending_seek();
        self.local_is_playing = false;
        actions.push(EngineAction::Player(PlayerCommand::Pause));
        actions.extend(self.emit(Payload::Pause(TimePayload { time: self.local_time })));
        actions
    }

    /// Explicit "sync everyone to me" intent, ahead of the periodic
    /// force-sync interval.
    fn handle_synchronize_now(&mut self) -> Vec<EngineAction> {
        if !matches!(self.state, EngineState::Ready) {
            return Vec::new();
        }
        self.emit(Payload::ForceSync(self.state_payload()))
    }

    /// Local scrub: move the player immediately, announce after the burst
    /// quiets down.
    fn handle_local_seek(&mut self, time: f64, now: E::Instant) -> Vec<EngineAction> {
        if !matches!(self.state, EngineState::Ready | EngineState::Seeking { .. }) {
            return Vec::new();
        }

        self.local_time = time;
        self.pending_seek = Some(time);
        self.state = EngineState::Seeking { since: now };

        vec![
            EngineAction::Player(PlayerCommand::Seek { time }),
            EngineAction::StartTimer {
                kind: TimerKind::SeekDebounce,
                duration: SEEK_DEBOUNCE,
                recurring: false,
            },
        ]
    }

    /// A play or pause transition that is still waiting behind the seek
    /// debounce must carry its position: send the pending `Seek` first.
    fn flush_pending_seek(&mut self) -> Vec<EngineAction> {
        let Some(time) = self.pending_seek.take() else {
            return Vec::new();
        };

        let mut actions = vec![EngineAction::CancelTimer { kind: TimerKind::SeekDebounce }];
        actions.extend(self.emit(Payload::Seek(TimePayload { time })));

        // The flushed seek still needs a settle window; without it a
        // no-op echo (play pressed while already playing) leaves the
        // engine in `Seeking` forever.
        self.enter_seeking(&mut actions);
        actions
    }

    /// Hold corrections until the player settles, with a timeout so a
    /// swallowed echo cannot wedge the engine.
    fn enter_seeking(&mut self, actions: &mut Vec<EngineAction>) {
        self.state = EngineState::Seeking { since: self.env.now() };
        actions.push(EngineAction::StartTimer {
            kind: TimerKind::SeekSettle,
            duration: SEEK_SETTLE,
            recurring: false,
        });
    }

    fn handle_player_state(&mut self, observed: PlaybackState) -> Vec<EngineAction> {
        let observed_playing = observed == PlaybackState::Playing;

        match self.state {
            EngineState::Uninitialized | EngineState::Suspended { .. } => Vec::new(),
            EngineState::Seeking { .. } => {
                // The player settling into the expected state completes the
                // seek early; anything else is transient seek noise.
                if observed_playing == self.local_is_playing {
                    self.state = EngineState::Ready;
                    vec![EngineAction::CancelTimer { kind: TimerKind::SeekSettle }]
                } else {
                    Vec::new()
                }
            },
            EngineState::Ready => {
                if observed_playing == self.local_is_playing {
                    // Echo of a command we issued ourselves.
                    return Vec::new();
                }

                // The user acted on the player surface directly.
                self.local_is_playing = observed_playing;
                let mut actions = self.flush_pending_seek();
                let payload = if observed_playing {
                    Payload::Play(TimePayload { time: self.local_time })
                } else {
                    Payload::Pause(TimePayload { time: self.local_time })
                };
                actions.extend(self.emit(payload));
                actions
            },
        }
    }

    fn handle_position(&mut self, time: f64) -> Vec<EngineAction> {
        if !matches!(self.state, EngineState::Suspended { .. }) {
            self.local_time = time;
        }
        Vec::new()
    }

    fn handle_player_failure(&mut self, command: &PlayerCommand, reason: &str) -> Vec<EngineAction> {
        let mut actions = vec![EngineAction::Log {
            message: format!("player command {command:?} failed: {reason}"),
        }];

        // Clear in-flight expectations so the next heartbeat cycle can
        // repair state from scratch.
        if matches!(self.state, EngineState::Seeking { .. }) {
            self.state = EngineState::Ready;
            actions.push(EngineAction::CancelTimer { kind: TimerKind::SeekSettle });
        }
        if self.awaiting_snapshot {
            self.awaiting_snapshot = false;
            self.resume_fallback = None;
            actions.push(EngineAction::CancelTimer { kind: TimerKind::SnapshotWait });
        }

        actions
    }

    fn handle_timer(&mut self, kind: TimerKind, now: E::Instant) -> Vec<EngineAction> {
        match kind {
            TimerKind::Heartbeat => {
                if matches!(self.state, EngineState::Ready) && self.connected {
                    self.emit(Payload::Sync(self.state_payload()))
                } else {
                    Vec::new()
                }
            },
            TimerKind::ForceSync => {
                if matches!(self.state, EngineState::Ready) && self.connected {
                    self.emit(Payload::ForceSync(self.state_payload()))
                } else {
                    Vec::new()
                }
            },
            TimerKind::SeekDebounce => {
                let Some(time) = self.pending_seek.take() else {
                    return Vec::new();
                };

                self.state = EngineState::Seeking { since: now };
                let mut actions = self.emit(Payload::Seek(TimePayload { time }));
                actions.push(EngineAction::StartTimer {
                    kind: TimerKind::SeekSettle,
                    duration: SEEK_SETTLE,
                    recurring: false,
                });
                actions
            },
            TimerKind::SeekSettle => {
                if matches!(self.state, EngineState::Seeking { .. }) {
                    self.state = EngineState::Ready;
                }
                Vec::new()
            },
            TimerKind::SnapshotWait => self.handle_snapshot_timeout(now),
        }
    }

    /// The authority never answered; fall back to what we know locally.
    fn handle_snapshot_timeout(&mut self, now: E::Instant) -> Vec<EngineAction> {
        if !self.awaiting_snapshot {
            return Vec::new();
        }
        self.awaiting_snapshot = false;

        let Some((time, is_playing)) = self.resume_fallback.take() else {
            return vec![EngineAction::Log {
                message: "no snapshot received, keeping local state".to_string(),
            }];
        };

        // Resume repair from our own projection.
        self.local_time = time;
        let mut actions = vec![
            EngineAction::Log {
                message: format!("no snapshot after resume, projecting locally to {time:.1}s"),
            },
            EngineAction::Player(PlayerCommand::Seek { time }),
        ];

        // The real player froze during suspension regardless of what we
        // believed; reassert the transition unconditionally.
        self.local_is_playing = is_playing;
        actions.push(EngineAction::Player(if is_playing {
            PlayerCommand::Play
        } else {
            PlayerCommand::Pause
        }));

        self.state = EngineState::Seeking { since: now };
        actions.push(EngineAction::StartTimer {
            kind: TimerKind::SeekSettle,
            duration: SEEK_SETTLE,
            recurring: false,
        });
        actions
    }

    fn handle_suspended(&mut self) -> Vec<EngineAction> {
        if matches!(self.state, EngineState::Suspended { .. } | EngineState::Uninitialized) {
            return Vec::new();
        }

        self.state = EngineState::Suspended {
            time: self.local_time,
            is_playing: self.local_is_playing,
            at_wall_ms: self.env.wall_clock_ms(),
        };
        self.pending_seek = None;

        vec![
            EngineAction::CancelTimer { kind: TimerKind::Heartbeat },
            EngineAction::CancelTimer { kind: TimerKind::ForceSync },
            EngineAction::CancelTimer { kind: TimerKind::SeekDebounce },
            EngineAction::CancelTimer { kind: TimerKind::SeekSettle },
        ]
    }

    /// Wake up: ask the authority where the room is, with a wall-clock
    /// projection of our own state as fallback.
    fn handle_resumed(&mut self, now: E::Instant) -> Vec<EngineAction> {
        let EngineState::Suspended { time, is_playing, at_wall_ms } = self.state else {
            return Vec::new();
        };

        let projected = if is_playing {
            let elapsed_ms = self.env.wall_clock_ms().saturating_sub(at_wall_ms);
            time + elapsed_ms as f64 / 1000.0
        } else {
            time
        };
        self.resume_fallback = Some((projected, is_playing));
        self.state = EngineState::Seeking { since: now };

        let mut actions = vec![
            EngineAction::StartTimer {
                kind: TimerKind::Heartbeat,
                duration: HEARTBEAT_INTERVAL,
                recurring: true,
            },
            EngineAction::StartTimer {
                kind: TimerKind::ForceSync,
                duration: FORCE_SYNC_INTERVAL,
                recurring: true,
            },
        ];

        if self.connected {
            self.awaiting_snapshot = true;
            actions.extend(self.emit(Payload::GetCurrent));
            actions.push(EngineAction::StartTimer {
                kind: TimerKind::SnapshotWait,
                duration: SNAPSHOT_WAIT,
                recurring: false,
            });
        } else {
            // No authority to ask; repair from the projection right away.
            self.awaiting_snapshot = true;
            actions.extend(self.handle_snapshot_timeout(now));
        }

        actions
    }

    fn handle_transport_up(&mut self) -> Vec<EngineAction> {
        self.connected = true;

        if matches!(self.state, EngineState::Uninitialized) {
            return Vec::new();
        }

        // Re-announce membership; the snapshot reply repairs any drift
        // accumulated while offline.
        self.join_room()
    }

    fn handle_transport_down(&mut self) -> Vec<EngineAction> {
        self.connected = false;
        vec![
            EngineAction::CancelTimer { kind: TimerKind::Heartbeat },
            EngineAction::CancelTimer { kind: TimerKind::ForceSync },
        ]
    }

    /// Snapshot of local state for outbound announcements.
    fn state_payload(&self) -> StatePayload {
        StatePayload {
            video_id: self.video_id.clone(),
            time: self.local_time,
            is_playing: self.local_is_playing,
        }
    }

    /// Build and queue an outbound frame. Suppressed while disconnected.
    fn emit(&self, payload: Payload) -> Vec<EngineAction> {
        if !self.connected {
            return Vec::new();
        }

        let mut header = FrameHeader::new(EventKind::Sync);
        header.set_room_id(self.room_id);
        header.set_sender_id(self.client_id);
        header.set_timestamp_ms(self.env.wall_clock_ms());

        match payload.into_frame(header) {
            Ok(frame) => vec![EngineAction::Send(frame)],
            Err(e) => vec![EngineAction::Log { message: format!("failed to encode frame: {e}") }],
        }
    }
}

impl<E: Environment> std::fmt::Debug for Engine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("client_id", &self.client_id)
            .field("room_id", &format!("{:#x}", self.room_id))
            .field("video_id", &self.video_id)
            .field("local_time", &self.local_time)
            .field("local_is_playing", &self.local_is_playing)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}
