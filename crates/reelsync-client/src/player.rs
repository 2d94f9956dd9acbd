//! Player backend abstraction.
//!
//! The engine never touches a video element directly; the runtime bridges
//! [`PlayerCommand`](crate::event::PlayerCommand)s to whatever implements
//! [`PlayerControl`].

/// Errors a player backend can report.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    /// The player exists but cannot accept commands yet (no media loaded,
    /// still buffering metadata).
    #[error("player not ready")]
    NotReady,

    /// Backend-specific failure.
    #[error("player backend error: {0}")]
    Backend(String),
}

/// A controllable video player.
///
/// Implementations wrap a real playback surface. Commands are best-effort:
/// the engine treats failures as degradation, not fatal errors, and keeps
/// the session alive.
pub trait PlayerControl: Send {
    /// Load a new video source, replacing the current one.
    fn load(&mut self, video_id: &str) -> Result<(), PlayerError>;

    /// Resume playback.
    fn play(&mut self) -> Result<(), PlayerError>;

    /// Pause playback.
    fn pause(&mut self) -> Result<(), PlayerError>;

    /// Jump to an absolute position in seconds.
    fn seek(&mut self, time: f64) -> Result<(), PlayerError>;

    /// Current playback position in seconds.
    fn current_time(&self) -> Result<f64, PlayerError>;
}
