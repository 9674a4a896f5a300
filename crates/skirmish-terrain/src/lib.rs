//! Terrain system for SKIRMISH.
//!
//! Sector grid with passability, reachability queries,
//! and local metric projection for distance estimates.

pub use skirmish_core as core;

pub mod grid;
pub mod projection;

// Re-export key types for convenience.
pub use grid::{Cell, GridHeader, MapGrid};
pub use projection::GeoProjection;
