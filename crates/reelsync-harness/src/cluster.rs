//! In-process simulation cluster.
//!
//! Wires one [`ServerDriver`] and any number of client [`Engine`]s together
//! under a single shared [`MockEnv`]. Frames route synchronously: an engine
//! `Send` becomes a server `FrameReceived` in the same pump, and server
//! sends/broadcasts land back in the target engines before the pump returns.
//! Timers the engines start are tracked in a virtual timer wheel and fired
//! in deadline order by [`SimCluster::advance`], so whole minutes of
//! heartbeat traffic run in microseconds and every run is reproducible.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use reelsync_client::{Engine, EngineAction, EngineEvent, PlayerCommand, PlayerControl, TimerKind};
use reelsync_core::{Environment, env::test_utils::MockEnv};
use reelsync_proto::RoomId;
use reelsync_server::{DriverConfig, ServerAction, ServerDriver, ServerEvent};

use crate::player::ModelPlayer;

/// A live timer in the virtual wheel.
struct SimTimer {
    fire_at: Instant,
    /// Re-arm interval for recurring timers.
    period: Option<Duration>,
}

/// One simulated client: engine, player, and its timer wheel.
struct SimClient {
    engine: Engine<MockEnv>,
    player: ModelPlayer,
    session_id: u64,
    timers: HashMap<TimerKind, SimTimer>,
    /// When false, frames in both directions are dropped on the floor.
    online: bool,
}

/// Pending dispatch inside one pump.
enum Dispatch {
    Server(ServerEvent),
    Client { idx: usize, event: EngineEvent<Instant> },
}

/// Deterministic cluster of one authority and N clients in one room.
pub struct SimCluster {
    env: MockEnv,
    driver: ServerDriver<MockEnv>,
    clients: Vec<SimClient>,
    room_id: RoomId,
    next_session: u64,
    /// Driver errors observed during routing; tests assert this stays empty.
    server_errors: Vec<String>,
}

impl SimCluster {
    /// Create an empty cluster for one room.
    pub fn new(room_id: RoomId) -> Self {
        let env = MockEnv::new();
        let driver = ServerDriver::new(env.clone(), DriverConfig::default());
        Self { env, driver, clients: Vec::new(), room_id, next_session: 1, server_errors: Vec::new() }
    }

    /// Shared virtual clock.
    pub fn env(&self) -> &MockEnv {
        &self.env
    }

    /// Driver errors observed during routing.
    pub fn server_errors(&self) -> &[String] {
        &self.server_errors
    }

    /// Engine of the given client.
    pub fn engine(&self, idx: usize) -> &Engine<MockEnv> {
        &self.clients[idx].engine
    }

    /// Player of the given client.
    pub fn player(&self, idx: usize) -> &ModelPlayer {
        &self.clients[idx].player
    }

    /// Mutable player access, for injecting divergence or failures.
    pub fn player_mut(&mut self, idx: usize) -> &mut ModelPlayer {
        &mut self.clients[idx].player
    }

    /// Player positions of all online clients, by index.
    pub fn positions(&self) -> Vec<f64> {
        self.clients.iter().filter(|c| c.online).map(|c| c.player.position()).collect()
    }

    /// Largest pairwise position difference among online clients.
    pub fn max_drift(&self) -> f64 {
        let positions = self.positions();
        let mut max = 0.0_f64;
        for (i, a) in positions.iter().enumerate() {
            for b in &positions[i + 1..] {
                max = max.max((a - b).abs());
            }
        }
        max
    }

    /// Add a client: accept its connection, attach its player, join the
    /// room, and deliver the join snapshot. Returns the client index.
    pub fn add_client(&mut self) -> usize {
        let idx = self.clients.len();
        let session_id = self.next_session;
        self.next_session += 1;
        let client_id = self.env.random_u64();

        self.clients.push(SimClient {
            engine: Engine::new(self.env.clone(), client_id, self.room_id),
            player: ModelPlayer::new(self.env.clone()),
            session_id,
            timers: HashMap::new(),
            online: true,
        });

        let mut queue = VecDeque::new();
        queue.push_back(Dispatch::Server(ServerEvent::ConnectionAccepted { session_id }));
        queue.push_back(Dispatch::Client { idx, event: EngineEvent::PlayerAttached });
        self.pump(queue);
        idx
    }

    /// Feed one event into a client engine and route everything it causes.
    pub fn client_event(&mut self, idx: usize, event: EngineEvent<Instant>) {
        let mut queue = VecDeque::new();
        queue.push_back(Dispatch::Client { idx, event });
        self.pump(queue);
    }

    /// User loads a video for the whole room.
    pub fn load(&mut self, idx: usize, video_id: &str) {
        self.client_event(idx, EngineEvent::LoadVideo { video_id: video_id.to_string() });
    }

    /// User resumes playback for the whole room.
    pub fn play(&mut self, idx: usize) {
        self.report_position(idx);
        self.client_event(idx, EngineEvent::Play);
    }

    /// User pauses playback for the whole room.
    pub fn pause(&mut self, idx: usize) {
        self.report_position(idx);
        self.client_event(idx, EngineEvent::Pause);
    }

    /// Feed the engine a fresh position report, as the runtime bridge's
    /// periodic `timeupdate` forwarding would.
    pub fn report_position(&mut self, idx: usize) {
        let time = self.clients[idx].player.position();
        self.client_event(idx, EngineEvent::PositionUpdate { time });
    }

    /// User scrubs to a position.
    pub fn seek(&mut self, idx: usize, time: f64) {
        let now = self.env.now();
        self.client_event(idx, EngineEvent::SeekTo { time, now });
    }

    /// Suspend a client: the player surface freezes and the engine is told.
    pub fn suspend(&mut self, idx: usize) {
        self.clients[idx].player.halt();
        let now = self.env.now();
        self.client_event(idx, EngineEvent::Suspended { now });
    }

    /// Resume a suspended client.
    pub fn resume(&mut self, idx: usize) {
        let now = self.env.now();
        self.client_event(idx, EngineEvent::Resumed { now });
    }

    /// Sever a client's transport: its session closes on the server and
    /// frames stop flowing in both directions.
    pub fn drop_transport(&mut self, idx: usize) {
        self.clients[idx].online = false;
        let session_id = self.clients[idx].session_id;
        let mut queue = VecDeque::new();
        queue.push_back(Dispatch::Server(ServerEvent::ConnectionClosed {
            session_id,
            reason: "simulated transport loss".to_string(),
        }));
        queue.push_back(Dispatch::Client { idx, event: EngineEvent::TransportDown });
        self.pump(queue);
    }

    /// Restore a severed transport under a fresh session.
    pub fn restore_transport(&mut self, idx: usize) {
        let session_id = self.next_session;
        self.next_session += 1;
        self.clients[idx].session_id = session_id;
        self.clients[idx].online = true;

        let mut queue = VecDeque::new();
        queue.push_back(Dispatch::Server(ServerEvent::ConnectionAccepted { session_id }));
        queue.push_back(Dispatch::Client { idx, event: EngineEvent::TransportUp });
        self.pump(queue);
    }

    /// Advance virtual time, firing due timers in deadline order.
    ///
    /// Before a timer fires, its engine gets a fresh position report from
    /// the player, so heartbeats carry the position a real runtime would
    /// observe.
    pub fn advance(&mut self, duration: Duration) {
        let target = self.env.now() + duration;

        while let Some(deadline) = self.next_deadline() {
            if deadline > target {
                break;
            }
            let gap = deadline.saturating_duration_since(self.env.now());
            self.env.advance(gap);
            self.fire_due(deadline);
        }

        let remaining = target.saturating_duration_since(self.env.now());
        self.env.advance(remaining);
    }

    /// Earliest live timer deadline across all online clients.
    fn next_deadline(&self) -> Option<Instant> {
        self.clients
            .iter()
            .filter(|c| c.online)
            .flat_map(|c| c.timers.values())
            .map(|t| t.fire_at)
            .min()
    }

    /// Fire every timer due at exactly `deadline`.
    fn fire_due(&mut self, deadline: Instant) {
        let mut due = Vec::new();
        for (idx, client) in self.clients.iter_mut().enumerate() {
            if !client.online {
                continue;
            }
            let mut fired = Vec::new();
            for (kind, timer) in &mut client.timers {
                if timer.fire_at == deadline {
                    fired.push(*kind);
                    if let Some(period) = timer.period {
                        timer.fire_at = deadline + period;
                    }
                }
            }
            for kind in fired {
                let recurring = client
                    .timers
                    .get(&kind)
                    .is_some_and(|t| t.period.is_some());
                if !recurring {
                    client.timers.remove(&kind);
                }
                due.push((idx, kind));
            }
        }

        let mut queue = VecDeque::new();
        for (idx, kind) in due {
            let position = self.clients[idx].player.position();
            queue.push_back(Dispatch::Client { idx, event: EngineEvent::PositionUpdate { time: position } });
            queue.push_back(Dispatch::Client {
                idx,
                event: EngineEvent::TimerFired { kind, now: deadline },
            });
        }
        self.pump(queue);
    }

    /// Drain the dispatch queue, routing frames between driver and engines.
    fn pump(&mut self, mut queue: VecDeque<Dispatch>) {
        while let Some(dispatch) = queue.pop_front() {
            match dispatch {
                Dispatch::Server(event) => self.dispatch_server(event, &mut queue),
                Dispatch::Client { idx, event } => self.dispatch_client(idx, event, &mut queue),
            }
        }
    }

    fn dispatch_server(&mut self, event: ServerEvent, queue: &mut VecDeque<Dispatch>) {
        let actions = match self.driver.process_event(event) {
            Ok(actions) => actions,
            Err(err) => {
                self.server_errors.push(err.to_string());
                return;
            },
        };

        for action in actions {
            match action {
                ServerAction::SendToSession { session_id, frame } => {
                    if let Some(idx) = self.idx_of_session(session_id) {
                        queue.push_back(Dispatch::Client {
                            idx,
                            event: EngineEvent::FrameReceived(frame),
                        });
                    }
                },
                ServerAction::BroadcastToRoom { room_id, frame, exclude_session } => {
                    let targets: Vec<u64> = self
                        .driver
                        .sessions_in_room(room_id)
                        .filter(|&s| Some(s) != exclude_session)
                        .collect();
                    for session_id in targets {
                        if let Some(idx) = self.idx_of_session(session_id) {
                            queue.push_back(Dispatch::Client {
                                idx,
                                event: EngineEvent::FrameReceived(frame.clone()),
                            });
                        }
                    }
                },
                ServerAction::CloseConnection { session_id, .. } => {
                    if let Some(idx) = self.idx_of_session(session_id) {
                        self.clients[idx].online = false;
                    }
                },
                ServerAction::Log { .. } => {},
            }
        }
    }

    fn dispatch_client(
        &mut self,
        idx: usize,
        event: EngineEvent<Instant>,
        queue: &mut VecDeque<Dispatch>,
    ) {
        // Frames cannot reach an offline client; local events still can.
        if !self.clients[idx].online && matches!(event, EngineEvent::FrameReceived(_)) {
            return;
        }

        let actions = self.clients[idx].engine.handle(event);
        for action in actions {
            match action {
                EngineAction::Send(frame) => {
                    if self.clients[idx].online {
                        queue.push_back(Dispatch::Server(ServerEvent::FrameReceived {
                            session_id: self.clients[idx].session_id,
                            frame,
                        }));
                    }
                },
                EngineAction::Player(command) => {
                    self.apply_player_command(idx, command, queue);
                },
                EngineAction::StartTimer { kind, duration, recurring } => {
                    self.clients[idx].timers.insert(
                        kind,
                        SimTimer {
                            fire_at: self.env.now() + duration,
                            period: recurring.then_some(duration),
                        },
                    );
                },
                EngineAction::CancelTimer { kind } => {
                    self.clients[idx].timers.remove(&kind);
                },
                EngineAction::Log { .. } => {},
            }
        }
    }

    /// Apply a player command, echoing state transitions and failures back
    /// to the engine the way a real runtime bridge does.
    fn apply_player_command(
        &mut self,
        idx: usize,
        command: PlayerCommand,
        queue: &mut VecDeque<Dispatch>,
    ) {
        let player = &mut self.clients[idx].player;
        let before = player.playback_state();

        let result = match &command {
            PlayerCommand::Load { video_id } => player.load(video_id),
            PlayerCommand::Play => player.play(),
            PlayerCommand::Pause => player.pause(),
            PlayerCommand::Seek { time } => player.seek(*time),
        };

        match result {
            Ok(()) => {
                let after = self.clients[idx].player.playback_state();
                if after != before {
                    queue.push_back(Dispatch::Client {
                        idx,
                        event: EngineEvent::PlayerStateChanged(after),
                    });
                }
            },
            Err(err) => {
                queue.push_back(Dispatch::Client {
                    idx,
                    event: EngineEvent::PlayerCommandFailed {
                        command,
                        reason: err.to_string(),
                    },
                });
            },
        }
    }

    fn idx_of_session(&self, session_id: u64) -> Option<usize> {
        self.clients.iter().position(|c| c.session_id == session_id && c.online)
    }
}
