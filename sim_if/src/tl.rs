//! # Traffic Light Reports

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A classified traffic light together with its estimated distance.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct TrafficLightReport {
    /// The classification of the light
    pub label: TrafficLightLabel,

    /// The estimated distance between the camera and the light in meters
    pub depth_m: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible traffic light classifications.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrafficLightLabel {
    Go,
    Stop,
    None,
}

impl Default for TrafficLightLabel {
    fn default() -> Self {
        TrafficLightLabel::None
    }
}
