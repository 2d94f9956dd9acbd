//! Shared core for the ReelSync watch-party sync system.
//!
//! Currently this is the [`env::Environment`] abstraction: protocol logic
//! in the authority and the client engine is written against it so the
//! same code runs on real clocks in production and on a virtual clock in
//! the deterministic harness.

pub mod env;

pub use env::Environment;
