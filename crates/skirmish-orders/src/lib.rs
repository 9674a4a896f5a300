//! Order planning, validation and execution for SKIRMISH.
//!
//! Each team owns an [`OrderQueue`]. The [`OrderOrchestrator`] drives all
//! queues through the planning → execution → review cycle of a combat turn
//! and signals the phase/turn machine when the cycle completes. Unit state
//! is reached through the [`Battlefield`] seam.

pub mod battlefield;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod validate;

pub use battlefield::{Battlefield, Effect, TerrainBattlefield};
pub use error::{OrchestratorError, OrderError};
pub use orchestrator::{ExecutionLogEntry, OrderOrchestrator};
pub use queue::{ExecutionResult, OrderQueue, ValidationReport};
