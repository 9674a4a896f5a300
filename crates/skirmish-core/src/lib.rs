//! Core types and definitions for SKIRMISH.
//!
//! This crate defines the vocabulary shared across all other crates:
//! participants, phase state, orders, wire events, snapshots, player
//! commands and constants. It has no dependency on an async runtime.

pub mod commands;
pub mod constants;
pub mod enums;
pub mod events;
pub mod order;
pub mod participant;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
