//! # Vehicle Control Commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Actuation command sent to the simulated vehicle once per control tick.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Default)]
pub struct VehicleControl {
    /// Throttle demand in the range [0, 1]
    pub throttle: f64,

    /// Steer demand in the range [-1, 1]. Positive steer increases yaw.
    pub steer: f64,

    /// Brake demand in the range [0, 1]
    pub brake: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VehicleControl {
    /// A command which holds the vehicle stationary.
    pub fn full_brake() -> Self {
        Self {
            throttle: 0.0,
            steer: 0.0,
            brake: 1.0,
        }
    }

    /// Return a copy of this command with all demands clamped to their valid ranges.
    pub fn clamped(&self) -> Self {
        Self {
            throttle: self.throttle.clamp(0.0, 1.0),
            steer: self.steer.clamp(-1.0, 1.0),
            brake: self.brake.clamp(0.0, 1.0),
        }
    }
}
