//! # DriveMgr Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::auto::{
    behav_plan::BehavPlanParams, local_plan::LocalPlanParams, per::PerParams,
    safety::SafetyParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveMgrParams {
    pub behav: BehavPlanParams,

    pub local_plan: LocalPlanParams,

    pub safety: SafetyParams,

    pub per: PerParams,

    /// Planning runs once every this many control ticks
    pub lp_frequency_divisor: usize,

    /// Lookahead distance when stationary
    pub lookahead_base_m: f64,

    /// Time horizon added to the lookahead, multiplied by the speed
    pub lookahead_time_s: f64,

    /// Fixed lookahead used while inside an intersection
    pub intersection_lookahead_m: f64,

    /// Half size of the square region around each intersection
    pub intersection_half_size_m: f64,

    /// Spacing of the interpolated reference given to trajectory control
    pub interp_resolution_m: f64,

    /// Distance to the last waypoint at which the mission is complete
    pub mission_complete_distance_m: f64,

    /// The vehicle is driving straight if all recent headings are within
    /// this tolerance of each other
    pub straight_heading_tolerance_rad: f64,

    /// Number of planning ticks of heading history
    pub heading_history_len: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DriveMgrParams {
    fn default() -> Self {
        Self {
            behav: BehavPlanParams::default(),
            local_plan: LocalPlanParams::default(),
            safety: SafetyParams::default(),
            per: PerParams::default(),
            lp_frequency_divisor: 2,
            lookahead_base_m: 16.0,
            lookahead_time_s: 1.0,
            intersection_lookahead_m: 30.0,
            intersection_half_size_m: 7.0,
            interp_resolution_m: 0.01,
            mission_complete_distance_m: 2.0,
            straight_heading_tolerance_rad: 5f64.to_radians(),
            heading_history_len: 10,
        }
    }
}
