//! ReelSync client reconciliation engine.
//!
//! Sans-IO state machine that keeps a local video player converged on a
//! room's shared playback state. The [`Engine`] processes
//! [`EngineEvent`]s and returns [`EngineAction`]s for the caller to
//! execute; it performs no I/O itself, so the same logic runs against real
//! transports and the deterministic simulation harness.
//!
//! With the `transport` feature enabled, [`transport`] provides a QUIC
//! connection to the authority and [`runtime`] a Tokio driver that wires
//! engine, player, timers, and transport together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod engine;
pub mod event;
pub mod player;

#[cfg(feature = "transport")]
pub mod runtime;
#[cfg(feature = "transport")]
pub mod transport;

pub use engine::{
    DRIFT_THRESHOLD, Engine, EngineState, FORCE_SYNC_INTERVAL, HEARTBEAT_INTERVAL, SEEK_DEBOUNCE,
    SEEK_SETTLE, SNAPSHOT_WAIT,
};
pub use event::{EngineAction, EngineEvent, PlaybackState, PlayerCommand, TimerKind};
pub use player::{PlayerControl, PlayerError};
