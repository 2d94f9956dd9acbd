//! ReelSync room-state authority.
//!
//! Production server that keeps watch-party rooms converged on one playback
//! state. The [`ServerDriver`] holds all protocol logic in a sans-IO,
//! action-based state machine; [`Server`] is the Tokio/Quinn runtime that
//! feeds it events and executes the actions it returns.
//!
//! # Components
//!
//! - [`ServerDriver`]: action-based orchestrator (pure logic, no I/O)
//! - [`RoomManager`]: authoritative per-room playback state
//! - [`Server`]: production runtime executing driver actions over QUIC
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod registry;
mod room;
mod room_manager;
mod system_env;
mod transport;

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use bytes::BytesMut;
pub use driver::{LogLevel, ServerAction, ServerConfig as DriverConfig, ServerDriver, ServerEvent};
pub use error::ServerError;
use reelsync_core::Environment;
use reelsync_proto::{Frame, FrameHeader};
pub use registry::ConnectionRegistry;
pub use room::Room;
pub use room_manager::{LeaveOutcome, RoomError, RoomManager};
pub use system_env::SystemEnv;
use tokio::sync::RwLock;
pub use transport::{QuinnConnection, QuinnTransport};

/// How often the runtime feeds a gauge-reporting tick to the driver.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state for all connections.
struct SharedState {
    /// Session ID → QUIC connection (for closing)
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Session ID → persistent outbound stream. All frames to a client go
    /// through this single stream, preserving per-connection ordering.
    outbound_streams: RwLock<HashMap<u64, tokio::sync::Mutex<quinn::SendStream>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: SocketAddr,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 4433)),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
        }
    }
}

type SharedDriver = Arc<tokio::sync::Mutex<ServerDriver<SystemEnv>>>;

/// Production ReelSync server.
///
/// Wraps [`ServerDriver`] with Quinn QUIC transport and system environment.
pub struct Server {
    /// The action-based server driver
    driver: ServerDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);

        let transport = QuinnTransport::bind(
            config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        Ok(Self { driver, transport, env })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until the endpoint is closed or an unrecoverable error occurs.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.transport.local_addr()?);

        let env = self.env;
        let driver: SharedDriver = Arc::new(tokio::sync::Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound_streams: RwLock::new(HashMap::new()),
        });

        spawn_tick_loop(Arc::clone(&driver), Arc::clone(&shared));

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, driver, shared, env).await {
                            tracing::error!("connection error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Periodically feed `Tick` to the driver for gauge reporting.
fn spawn_tick_loop(driver: SharedDriver, shared: Arc<SharedState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let actions = {
                let mut driver = driver.lock().await;
                driver.process_event(ServerEvent::Tick)
            };
            match actions {
                Ok(actions) => {
                    let driver = driver.lock().await;
                    execute_actions(&driver, actions, &shared).await;
                },
                Err(e) => tracing::error!("tick failed: {e}"),
            }
        }
    });
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    driver: SharedDriver,
    shared: Arc<SharedState>,
    env: SystemEnv,
) -> Result<(), ServerError> {
    let session_id = env.random_u64();

    tracing::debug!(session_id, remote = %conn.remote_addr(), "new connection");

    let outbound_stream = conn.open_uni().await?;

    {
        let mut connections = shared.connections.write().await;
        connections.insert(session_id, conn.clone());
    }
    {
        let mut streams = shared.outbound_streams.write().await;
        streams.insert(session_id, tokio::sync::Mutex::new(outbound_stream));
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { session_id })?;
        execute_actions(&driver, actions, &shared).await;
    }

    // Each client frame arrives on its own unidirectional stream; the
    // protocol is fire-and-forget, so a stream closes after one frame.
    loop {
        match conn.accept_uni().await {
            Ok(recv) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(session_id, recv, driver, &shared).await {
                        tracing::debug!(session_id, "stream error: {e}");
                    }
                });
            },
            Err(e) => {
                tracing::debug!(session_id, "connection closed: {e}");
                break;
            },
        }
    }

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&session_id);
    }
    {
        let mut streams = shared.outbound_streams.write().await;
        streams.remove(&session_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            session_id,
            reason: "connection closed".to_string(),
        })?;
        execute_actions(&driver, actions, &shared).await;
    }

    Ok(())
}

/// Read one frame from a unidirectional stream and feed it to the driver.
async fn handle_stream(
    session_id: u64,
    mut recv: quinn::RecvStream,
    driver: SharedDriver,
    shared: &Arc<SharedState>,
) -> Result<(), ServerError> {
    let mut buf = BytesMut::zeroed(FrameHeader::SIZE);

    recv.read_exact(&mut buf[..FrameHeader::SIZE])
        .await
        .map_err(|e| ServerError::Transport(format!("header read failed: {e}")))?;

    // Validates magic/version/size before any payload allocation.
    let payload_size = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])?.payload_size() as usize;

    if payload_size > 0 {
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| ServerError::Transport(format!("payload read failed: {e}")))?;
    }

    let frame = Frame::decode(&buf)?;

    let result = {
        let mut driver = driver.lock().await;
        driver.process_event(ServerEvent::FrameReceived { session_id, frame })
    };

    match result {
        Ok(actions) => {
            let driver = driver.lock().await;
            execute_actions(&driver, actions, shared).await;
            Ok(())
        },
        Err(e) => {
            tracing::warn!(session_id, "frame processing error: {e}");
            Ok(())
        },
    }
}

/// Execute driver actions against the real transport.
///
/// Write failures to individual sessions are logged, not propagated; a slow
/// or dead peer must not take down frame processing for the room.
async fn execute_actions(
    driver: &ServerDriver<SystemEnv>,
    actions: Vec<ServerAction>,
    shared: &SharedState,
) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, frame } => {
                let buf = match frame.encode_to_vec() {
                    Ok(buf) => buf,
                    Err(e) => {
                        tracing::error!("failed to encode frame: {e}");
                        continue;
                    },
                };

                let streams = shared.outbound_streams.read().await;
                if let Some(stream_mutex) = streams.get(&session_id) {
                    let mut stream = stream_mutex.lock().await;
                    if let Err(e) = stream.write_all(&buf).await {
                        tracing::warn!(session_id, "send failed: {e}");
                    }
                } else {
                    tracing::warn!(session_id, "send: session not found");
                }
            },

            ServerAction::BroadcastToRoom { room_id, frame, exclude_session } => {
                let sessions: Vec<u64> = driver.sessions_in_room(room_id).collect();

                let buf = match frame.encode_to_vec() {
                    Ok(buf) => buf,
                    Err(e) => {
                        tracing::error!("failed to encode frame: {e}");
                        continue;
                    },
                };

                let streams = shared.outbound_streams.read().await;
                for session_id in sessions {
                    if Some(session_id) == exclude_session {
                        continue;
                    }
                    if let Some(stream_mutex) = streams.get(&session_id) {
                        let mut stream = stream_mutex.lock().await;
                        if let Err(e) = stream.write_all(&buf).await {
                            tracing::warn!(session_id, "broadcast write failed: {e}");
                        }
                    }
                }
            },

            ServerAction::CloseConnection { session_id, reason } => {
                tracing::info!(session_id, "closing connection: {reason}");
                let mut connections = shared.connections.write().await;
                if let Some(conn) = connections.remove(&session_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}
