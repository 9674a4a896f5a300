//! Phase and turn orchestration for SKIRMISH.
//!
//! Owns phase/subphase/turn/clock state, the director rule and turn
//! rotation. Remote transitions arrive from the sync channel; local
//! authoritative ones are applied first and broadcast after.

pub mod clock;
pub mod error;
pub mod machine;
pub mod rotation;

pub use skirmish_core as core;
pub use clock::{ClockTick, TurnClock};
pub use error::TurnError;
pub use machine::{
    PhaseTurnStateMachine, Readiness, RemoteOutcome, TickOutcome, TurnAdvance, TurnConfig,
};

#[cfg(test)]
mod tests;
