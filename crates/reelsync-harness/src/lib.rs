//! Deterministic simulation harness for ReelSync convergence testing.
//!
//! Runs the real server driver and real client engines in one process
//! under a shared virtual clock. No sockets, no tasks, no wall time:
//! frames route synchronously and timers fire in deadline order, so a
//! scenario spanning minutes of playback executes in microseconds and
//! reproduces exactly.
//!
//! [`SimCluster`] is the entry point; [`ModelPlayer`] stands in for the
//! playback surface and records every command the engine issues.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod player;

pub use cluster::SimCluster;
pub use player::ModelPlayer;
