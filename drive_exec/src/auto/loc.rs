//! # Localisation types
//!
//! Pose and ego state of the vehicle in the 2D world frame. Positions are in
//! meters, headings in radians measured anticlockwise from the +X axis.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use sim_if::meas::PlayerMeasurement;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A pose (position and heading) in the world frame.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Pose {
    /// The position in the world frame
    pub position_m: Vector2<f64>,

    /// The heading (angle to the +ve X axis)
    pub heading_rad: f64,
}

/// The ego vehicle's pose and the speed estimate used for planning.
///
/// Between planner ticks the speed is the open-loop estimate produced by the
/// velocity planner rather than the measured speed.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EgoState {
    pub pose: Pose,

    /// Speed along the heading
    pub speed_ms: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad,
        }
    }

    /// Unit vector pointing in the direction of the heading.
    pub fn forward2(&self) -> Vector2<f64> {
        Vector2::new(self.heading_rad.cos(), self.heading_rad.sin())
    }

    /// Unit vector pointing to the left of the heading.
    pub fn left2(&self) -> Vector2<f64> {
        Vector2::new(-self.heading_rad.sin(), self.heading_rad.cos())
    }
}

impl EgoState {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64, speed_ms: f64) -> Self {
        Self {
            pose: Pose::new(x_m, y_m, heading_rad),
            speed_ms,
        }
    }

    pub fn position2(&self) -> Vector2<f64> {
        self.pose.position_m
    }

    pub fn heading(&self) -> f64 {
        self.pose.heading_rad
    }
}

impl From<&PlayerMeasurement> for Pose {
    fn from(player: &PlayerMeasurement) -> Self {
        Pose::new(player.x_m, player.y_m, player.yaw_rad)
    }
}
