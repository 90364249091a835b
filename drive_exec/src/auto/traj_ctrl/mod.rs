//! # Trajectory control module
//!
//! Trajectory control is responsible for keeping the vehicle on the
//! reference produced by the local planner. The reference is a finely
//! interpolated sequence of points, each carrying the speed the vehicle
//! should have there.
//!
//! Every control tick the point of the reference nearest the vehicle is
//! found. The segment from that point to the next defines the lateral and
//! heading errors, which a Stanley law turns into a steering demand. The
//! speed a short distance further along the reference is tracked by a PID
//! controller with a polynomial feed-forward, whose output is split into
//! throttle and brake demands.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod controllers;
pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use controllers::*;
pub use params::TrajCtrlParams;
pub use state::*;
