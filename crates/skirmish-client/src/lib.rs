//! SKIRMISH client runtime.
//!
//! Wires the sync channel, the phase/turn machine and the order
//! orchestrator into one event loop per client. Headless: a UI talks to it
//! through [`PlayerCommand`]s and reads [`ClientView`] updates back.
//!
//! [`PlayerCommand`]: skirmish_core::commands::PlayerCommand

pub mod config;
pub mod session;

pub use config::{ClientConfig, ConfigError};
pub use session::{ClientSession, ClientView, LoopCommand, MatchOutcome, SessionError, SessionHandle};

#[cfg(test)]
mod tests;
