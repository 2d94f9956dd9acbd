//! Engine events and actions.

use std::time::Duration;

use reelsync_proto::Frame;

/// Playback state reported by the player backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// The player is playing.
    Playing,
    /// The player is paused.
    Paused,
}

/// Commands the engine issues to the player backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    /// Load a new video source.
    Load {
        /// Source identifier to load.
        video_id: String,
    },
    /// Resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Jump to an absolute position in seconds.
    Seek {
        /// Target position in seconds.
        time: f64,
    },
}

/// Timers the engine asks its runtime to manage.
///
/// At most one timer per kind is live at a time; starting a kind that is
/// already running restarts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Recurring passive `Sync` heartbeat.
    Heartbeat,
    /// Recurring unconditional `ForceSync` broadcast.
    ForceSync,
    /// Collapses a scrub burst into one `Seek` frame.
    SeekDebounce,
    /// Grace period after a correction during which player-originated
    /// events and inbound `Sync` frames are not treated as intent.
    SeekSettle,
    /// Deadline for a `Snapshot` reply after `Join`, `GetCurrent`, or
    /// resume.
    SnapshotWait,
}

/// Events the caller feeds into the engine.
///
/// The caller is responsible for:
/// - Receiving frames from the network
/// - Forwarding player callbacks (state changes, position reports)
/// - Firing timers the engine started
/// - Forwarding user intents (load, play, pause, seek)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulated clocks.
#[derive(Debug, Clone)]
pub enum EngineEvent<I = std::time::Instant> {
    /// Frame received from the authority.
    FrameReceived(Frame),

    /// A controllable player became available.
    ///
    /// Until this event the engine buffers inbound frames; they are
    /// replayed once the player attaches.
    PlayerAttached,

    /// User intent: load a new video for the whole room.
    LoadVideo {
        /// Source identifier to load.
        video_id: String,
    },

    /// User intent: resume playback for the whole room.
    Play,

    /// User intent: pause playback for the whole room.
    Pause,

    /// User intent: jump to a position for the whole room.
    SeekTo {
        /// Target position in seconds.
        time: f64,
        /// Current time, for debounce bookkeeping.
        now: I,
    },

    /// User intent: broadcast an unconditional convergence point now,
    /// without waiting for the periodic force-sync interval.
    SynchronizeNow,

    /// The player backend reported a playback state change.
    ///
    /// Covers both echoes of engine-issued commands and direct user
    /// interaction with the player surface.
    PlayerStateChanged(PlaybackState),

    /// Periodic position report from the player backend.
    PositionUpdate {
        /// Current playback position in seconds.
        time: f64,
    },

    /// A player command issued earlier could not be executed.
    PlayerCommandFailed {
        /// The command that failed.
        command: PlayerCommand,
        /// Backend-specific reason.
        reason: String,
    },

    /// A timer started via [`EngineAction::StartTimer`] fired.
    TimerFired {
        /// Which timer fired.
        kind: TimerKind,
        /// Current time from the environment.
        now: I,
    },

    /// The host is being suspended (tab hidden, device sleep).
    Suspended {
        /// Current time from the environment.
        now: I,
    },

    /// The host woke up from suspension.
    Resumed {
        /// Current time from the environment.
        now: I,
    },

    /// The transport connected (or reconnected).
    TransportUp,

    /// The transport dropped.
    TransportDown,
}

/// Actions the engine produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum EngineAction {
    /// Send a frame to the authority.
    Send(Frame),

    /// Issue a command to the player backend.
    ///
    /// On failure the caller feeds back
    /// [`EngineEvent::PlayerCommandFailed`].
    Player(PlayerCommand),

    /// Start (or restart) a timer of the given kind.
    StartTimer {
        /// Timer identity; restarts any live timer of the same kind.
        kind: TimerKind,
        /// Time until the timer fires.
        duration: Duration,
        /// Whether the timer re-arms itself after firing.
        recurring: bool,
    },

    /// Cancel a live timer. No-op if none is running.
    CancelTimer {
        /// Timer identity.
        kind: TimerKind,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
