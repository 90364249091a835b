//! # Simulation interface crate.
//!
//! Provides the data structures which cross the boundary between the
//! simulation (or a recording of it) and the drive software. No transport is
//! defined here, only the data.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Per-tick measurements reported by the simulation
pub mod meas;

/// Actuation commands sent back to the simulation
pub mod ctrl;

/// Traffic light reports
pub mod tl;
