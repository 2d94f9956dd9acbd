//! Tokio runtime driving an [`Engine`] against real I/O.
//!
//! Owns the engine, a player backend, the QUIC transport channels, and the
//! engine's timers. User intents arrive on an [`EngineHandle`]; everything
//! else (inbound frames, timer fires, player command results) is fed to the
//! engine internally.

use std::{collections::HashMap, time::Duration};

use reelsync_core::Environment;
use tokio::sync::mpsc;

use crate::{
    engine::Engine,
    event::{EngineAction, EngineEvent, PlaybackState, PlayerCommand, TimerKind},
    player::PlayerControl,
    transport::ConnectedClient,
};

/// Production environment backed by Tokio and the OS.
#[derive(Clone, Default)]
pub struct TokioEnv;

impl TokioEnv {
    /// Create a new Tokio-backed environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for TokioEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

/// Handle for feeding user intents and lifecycle events to a running
/// engine.
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    /// Feed an event to the engine. Fails if the runtime has shut down.
    pub async fn send(&self, event: EngineEvent) -> Result<(), EngineStopped> {
        self.events.send(event).await.map_err(|_| EngineStopped)
    }

    /// Signal that a controllable player is attached; triggers the room
    /// join handshake.
    pub async fn attach_player(&self) -> Result<(), EngineStopped> {
        self.send(EngineEvent::PlayerAttached).await
    }

    /// Load a new video for the whole room.
    pub async fn load_video(&self, video_id: impl Into<String>) -> Result<(), EngineStopped> {
        self.send(EngineEvent::LoadVideo { video_id: video_id.into() }).await
    }

    /// Start playback for the whole room.
    pub async fn play(&self) -> Result<(), EngineStopped> {
        self.send(EngineEvent::Play).await
    }

    /// Pause playback for the whole room.
    pub async fn pause(&self) -> Result<(), EngineStopped> {
        self.send(EngineEvent::Pause).await
    }

    /// Scrub to a position in seconds.
    pub async fn seek_to(&self, time: f64) -> Result<(), EngineStopped> {
        self.send(EngineEvent::SeekTo { time, now: std::time::Instant::now() }).await
    }

    /// Push the local state to every participant immediately, ahead of
    /// the periodic broadcast.
    pub async fn synchronize_now(&self) -> Result<(), EngineStopped> {
        self.send(EngineEvent::SynchronizeNow).await
    }

    /// Report a playback transition observed on the player surface.
    pub async fn player_state_changed(&self, state: PlaybackState) -> Result<(), EngineStopped> {
        self.send(EngineEvent::PlayerStateChanged(state)).await
    }
}

/// The engine runtime has shut down.
#[derive(Debug, thiserror::Error)]
#[error("engine runtime stopped")]
pub struct EngineStopped;

/// Run an engine against a player and transport until the transport
/// closes.
///
/// The driver keeps its own sender for timer fires and player command
/// results, so dropping every [`EngineHandle`] does not stop it; abort the
/// returned join handle (or close the transport) to shut down.
///
/// Returns an [`EngineHandle`] for user intents and the join handle of the
/// driver task.
pub fn spawn_engine<P>(
    engine: Engine<TokioEnv>,
    player: P,
    transport: ConnectedClient,
) -> (EngineHandle, tokio::task::JoinHandle<()>)
where
    P: PlayerControl + 'static,
{
    let (events_tx, events_rx) = mpsc::channel(64);
    let handle = EngineHandle { events: events_tx.clone() };

    let task = tokio::spawn(drive(engine, player, transport, events_tx, events_rx));

    (handle, task)
}

/// Timer bookkeeping: at most one live timer per kind.
struct Timers {
    events: mpsc::Sender<EngineEvent>,
    live: HashMap<TimerKind, tokio::task::AbortHandle>,
}

impl Timers {
    fn new(events: mpsc::Sender<EngineEvent>) -> Self {
        Self { events, live: HashMap::new() }
    }

    fn start(&mut self, kind: TimerKind, duration: Duration, recurring: bool) {
        self.cancel(kind);

        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(duration).await;
                let fired = EngineEvent::TimerFired { kind, now: std::time::Instant::now() };
                if events.send(fired).await.is_err() || !recurring {
                    break;
                }
            }
        });

        self.live.insert(kind, handle.abort_handle());
    }

    fn cancel(&mut self, kind: TimerKind) {
        if let Some(handle) = self.live.remove(&kind) {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.live.drain() {
            handle.abort();
        }
    }
}

async fn drive<P>(
    mut engine: Engine<TokioEnv>,
    mut player: P,
    mut transport: ConnectedClient,
    events_tx: mpsc::Sender<EngineEvent>,
    mut events_rx: mpsc::Receiver<EngineEvent>,
) where
    P: PlayerControl + 'static,
{
    let mut timers = Timers::new(events_tx.clone());

    loop {
        let event = tokio::select! {
            Some(event) = events_rx.recv() => event,
            frame = transport.from_server.recv() => match frame {
                Some(frame) => EngineEvent::FrameReceived(frame),
                None => {
                    tracing::info!("transport closed, stopping engine");
                    break;
                },
            },
            else => break,
        };

        let actions = engine.handle(event);
        execute_actions(actions, &mut player, &mut timers, &transport, &events_tx).await;
    }

    timers.cancel_all();
    transport.stop();
}

async fn execute_actions<P: PlayerControl>(
    actions: Vec<EngineAction>,
    player: &mut P,
    timers: &mut Timers,
    transport: &ConnectedClient,
    events_tx: &mpsc::Sender<EngineEvent>,
) {
    for action in actions {
        match action {
            EngineAction::Send(frame) => {
                if transport.to_server.send(frame).await.is_err() {
                    tracing::warn!("transport send channel closed");
                }
            },

            EngineAction::Player(command) => {
                let result = match &command {
                    PlayerCommand::Load { video_id } => player.load(video_id),
                    PlayerCommand::Play => player.play(),
                    PlayerCommand::Pause => player.pause(),
                    PlayerCommand::Seek { time } => player.seek(*time),
                };

                if let Err(e) = result {
                    let failed = EngineEvent::PlayerCommandFailed {
                        command,
                        reason: e.to_string(),
                    };
                    if events_tx.send(failed).await.is_err() {
                        tracing::warn!("engine event channel closed");
                    }
                }
            },

            EngineAction::StartTimer { kind, duration, recurring } => {
                timers.start(kind, duration, recurring);
            },

            EngineAction::CancelTimer { kind } => {
                timers.cancel(kind);
            },

            EngineAction::Log { message } => {
                tracing::debug!("{message}");
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_methods_map_to_engine_events() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = EngineHandle { events: tx };

        handle.attach_player().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::PlayerAttached));

        handle.load_video("movie").await.unwrap();
        match rx.recv().await.unwrap() {
            EngineEvent::LoadVideo { video_id } => assert_eq!(video_id, "movie"),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.play().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::Play));

        handle.pause().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::Pause));

        handle.seek_to(42.0).await.unwrap();
        match rx.recv().await.unwrap() {
            EngineEvent::SeekTo { time, .. } => assert_eq!(time, 42.0),
            other => panic!("unexpected event: {other:?}"),
        }

        handle.synchronize_now().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::SynchronizeNow));

        handle.player_state_changed(PlaybackState::Paused).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::PlayerStateChanged(PlaybackState::Paused)
        ));
    }

    #[tokio::test]
    async fn dropped_runtime_reports_stopped() {
        let (tx, rx) = mpsc::channel(1);
        let handle = EngineHandle { events: tx };
        drop(rx);

        assert!(handle.play().await.is_err());
    }
}
