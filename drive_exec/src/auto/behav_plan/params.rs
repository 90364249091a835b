//! Behaviour planner parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the behaviour planner
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BehavPlanParams {
    /// Distance the stop goal is pulled back from the stop line or traffic
    /// light
    pub stop_line_buffer_m: f64,

    /// Below this speed the vehicle is considered stopped
    pub stop_threshold_ms: f64,

    /// Distance from the stop goal within which a stopped vehicle is
    /// considered to have reached it
    pub stop_position_tolerance_m: f64,

    /// Number of planning ticks to hold at a stop line before moving on
    pub stop_hold_ticks: usize,

    /// A red light closer than this distance triggers a stop
    pub traffic_light_stop_depth_m: f64,

    /// Maximum angle between the ego heading and the bearing to a lead
    /// vehicle candidate
    pub lead_heading_tolerance_rad: f64,

    /// A followed lead vehicle is dropped once it is further than this
    pub lead_lookahead_m: f64,

    /// A lead vehicle candidate is only picked up inside this radius
    pub lead_activation_m: f64,
}

impl Default for BehavPlanParams {
    fn default() -> Self {
        Self {
            stop_line_buffer_m: 3.5,
            stop_threshold_ms: 0.02,
            stop_position_tolerance_m: 3.0,
            stop_hold_ticks: 10,
            traffic_light_stop_depth_m: 15.0,
            lead_heading_tolerance_rad: 25f64.to_radians(),
            lead_lookahead_m: 25.0,
            lead_activation_m: 13.0,
        }
    }
}
