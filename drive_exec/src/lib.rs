//! # Drive library.
//!
//! This library allows the executable and other crates in the workspace to
//! access the autonomy modules of the drive software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Autonomy module - behaviour, local planning and trajectory control
pub mod auto;
