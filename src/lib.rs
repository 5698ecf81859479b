//! Reclaim: Session Lifecycle and Leak Reclamation
//!
//! A process-wide application engine registry that hands out exclusive write
//! sessions per thread, guards them with a circuit-breaking state machine, and
//! reclaims sessions that are dropped without being closed on a background
//! reaper thread.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod reaper;
pub mod session;
