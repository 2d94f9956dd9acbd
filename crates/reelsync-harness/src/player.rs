//! Scripted player backend for simulation.
//!
//! Models a real playback surface well enough for convergence testing:
//! position advances with the virtual clock while playing, commands mutate
//! state instantly, and every command is recorded so tests can assert on
//! what the engine actually asked the player to do.

use std::time::Instant;

use reelsync_client::{PlaybackState, PlayerControl, PlayerError};
use reelsync_core::{Environment, env::test_utils::MockEnv};

/// Deterministic in-memory player driven by the shared virtual clock.
pub struct ModelPlayer {
    env: MockEnv,
    video_id: Option<String>,
    /// Position at `last_updated`.
    base_time: f64,
    is_playing: bool,
    last_updated: Instant,
    /// Every seek target the engine issued, in order.
    seeks: Vec<f64>,
    /// Every video id the engine loaded, in order.
    loads: Vec<String>,
    /// When set, all commands fail with this reason.
    failure: Option<String>,
}

impl ModelPlayer {
    /// Create a player bound to the cluster's virtual clock.
    pub fn new(env: MockEnv) -> Self {
        let now = env.now();
        Self {
            env,
            video_id: None,
            base_time: 0.0,
            is_playing: false,
            last_updated: now,
            seeks: Vec::new(),
            loads: Vec::new(),
            failure: None,
        }
    }

    /// Current playback position, projected by the virtual clock.
    pub fn position(&self) -> f64 {
        if self.is_playing {
            self.base_time + (self.env.now() - self.last_updated).as_secs_f64()
        } else {
            self.base_time
        }
    }

    /// Current playback state.
    pub fn playback_state(&self) -> PlaybackState {
        if self.is_playing { PlaybackState::Playing } else { PlaybackState::Paused }
    }

    /// Currently loaded video, if any.
    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Seek targets the engine issued, in order.
    pub fn seek_history(&self) -> &[f64] {
        &self.seeks
    }

    /// Video ids the engine loaded, in order.
    pub fn load_history(&self) -> &[String] {
        &self.loads
    }

    /// Make every subsequent command fail with the given reason.
    pub fn fail_with(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
    }

    /// Stop injecting failures.
    pub fn heal(&mut self) {
        self.failure = None;
    }

    /// Overwrite playback state without recording a command.
    ///
    /// Simulates out-of-band divergence (buffering stall, user poking the
    /// raw surface) that the engine has not observed yet.
    pub fn force_state(&mut self, time: f64, is_playing: bool) {
        self.base_time = time;
        self.is_playing = is_playing;
        self.last_updated = self.env.now();
    }

    /// Freeze playback in place without recording a command.
    ///
    /// Simulates a suspended tab: the surface stops advancing but no
    /// pause event reaches the engine.
    pub fn halt(&mut self) {
        self.base_time = self.position();
        self.is_playing = false;
        self.last_updated = self.env.now();
    }

    fn check_failure(&self) -> Result<(), PlayerError> {
        match &self.failure {
            Some(reason) => Err(PlayerError::Backend(reason.clone())),
            None => Ok(()),
        }
    }
}

impl PlayerControl for ModelPlayer {
    fn load(&mut self, video_id: &str) -> Result<(), PlayerError> {
        self.check_failure()?;
        self.video_id = Some(video_id.to_string());
        self.base_time = 0.0;
        self.is_playing = false;
        self.last_updated = self.env.now();
        self.loads.push(video_id.to_string());
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.check_failure()?;
        if !self.is_playing {
            self.base_time = self.position();
            self.is_playing = true;
            self.last_updated = self.env.now();
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.check_failure()?;
        if self.is_playing {
            self.base_time = self.position();
            self.is_playing = false;
            self.last_updated = self.env.now();
        }
        Ok(())
    }

    fn seek(&mut self, time: f64) -> Result<(), PlayerError> {
        self.check_failure()?;
        self.base_time = time;
        self.last_updated = self.env.now();
        self.seeks.push(time);
        Ok(())
    }

    fn current_time(&self) -> Result<f64, PlayerError> {
        self.check_failure()?;
        Ok(self.position())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn position_advances_only_while_playing() {
        let env = MockEnv::new();
        let mut player = ModelPlayer::new(env.clone());
        player.load("vid").unwrap();

        env.advance(Duration::from_secs(5));
        assert!((player.position() - 0.0).abs() < f64::EPSILON);

        player.play().unwrap();
        env.advance(Duration::from_secs(5));
        assert!((player.position() - 5.0).abs() < 1e-9);

        player.pause().unwrap();
        env.advance(Duration::from_secs(5));
        assert!((player.position() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn seek_rebases_position() {
        let env = MockEnv::new();
        let mut player = ModelPlayer::new(env.clone());
        player.load("vid").unwrap();
        player.play().unwrap();

        player.seek(100.0).unwrap();
        env.advance(Duration::from_secs(2));

        assert!((player.position() - 102.0).abs() < 1e-9);
        assert_eq!(player.seek_history(), &[100.0]);
    }

    #[test]
    fn halt_freezes_without_recording() {
        let env = MockEnv::new();
        let mut player = ModelPlayer::new(env.clone());
        player.load("vid").unwrap();
        player.play().unwrap();
        env.advance(Duration::from_secs(10));

        player.halt();
        env.advance(Duration::from_secs(10));

        assert!((player.position() - 10.0).abs() < 1e-9);
        assert_eq!(player.playback_state(), PlaybackState::Paused);
    }

    #[test]
    fn injected_failure_surfaces_as_backend_error() {
        let env = MockEnv::new();
        let mut player = ModelPlayer::new(env);
        player.fail_with("decoder crashed");

        assert!(player.play().is_err());

        player.heal();
        assert!(player.play().is_ok());
    }
}
