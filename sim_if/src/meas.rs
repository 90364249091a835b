//! # Simulation Measurements

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::tl::TrafficLightReport;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// All data reported by the simulation for a single control tick.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Measurement {
    /// Simulation time in seconds
    pub timestamp_s: f64,

    /// Index of the simulation frame
    pub frame: u64,

    /// The ego vehicle
    pub player: PlayerMeasurement,

    /// All other agents in the world
    #[serde(default)]
    pub agents: Vec<AgentMeasurement>,

    /// A traffic light report, if the simulation provides one directly
    #[serde(default)]
    pub traffic_light: Option<TrafficLightReport>,
}

/// State of the ego vehicle.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default)]
pub struct PlayerMeasurement {
    /// Position in the world frame, meters
    pub x_m: f64,
    pub y_m: f64,

    /// Yaw in the world frame, radians
    pub yaw_rad: f64,

    /// Forward speed, meters/second
    pub forward_speed_ms: f64,

    /// Half-extents of the bounding box
    pub extent: Extent,
}

/// State of a non-player agent.
#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct AgentMeasurement {
    pub kind: AgentKind,

    /// Position in the world frame, meters
    pub x_m: f64,
    pub y_m: f64,

    /// Yaw in the world frame, radians
    pub yaw_rad: f64,

    /// Forward speed, meters/second
    pub forward_speed_ms: f64,

    /// Half-extents of the bounding box
    pub extent: Extent,
}

/// Half-extents of an agent's bounding box along its own x and y axes.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct Extent {
    pub x_m: f64,
    pub y_m: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AgentKind {
    Vehicle,
    Pedestrian,
}
