//! # Autonomy Module
//!
//! This module drives the vehicle along a precomputed route. Each control
//! tick the [`DriveMgr`] decides what to do (behaviour planning), where to go
//! in the next few seconds (local planning) and how to actuate (trajectory
//! control).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use drive_mgr::{DriveMgr, DriveMgrError, DriveMgrParams, DriveOutput};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Drive manager - runs the per tick data flow between all other modules
pub mod drive_mgr;

/// Localisation types - poses and ego state
pub mod loc;

/// Geometry utilities - rigid transforms and interpolation
pub mod geom;

/// Defines path and speed profile types
pub mod path;

/// Route module - the global reference route and its preparation
pub mod route;

/// Behavioural planning - the driving intent state machine
pub mod behav_plan;

/// Local planning - candidate paths, collision checking and velocity profiles
pub mod local_plan;

/// Perception module - obstacle extraction and traffic light detection
pub mod per;

/// Safety rules which raise the emergency flags
pub mod safety;

/// Trajectory control module - keeps the vehicle on the given path
pub mod traj_ctrl;
