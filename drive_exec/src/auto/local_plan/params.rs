//! # Local planner parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the local planner and its components
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LocalPlanParams {
    pub path_gen: PathGenParams,
    pub collision: CollisionParams,
    pub velocity: VelocityParams,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PathGenParams {
    /// Number of candidate paths, must be odd
    pub num_paths: usize,

    /// Lateral spacing between neighbouring goal states
    pub path_offset_m: f64,

    /// Arc length between samples of a candidate path
    pub path_step_m: f64,

    /// Paths whose curvature magnitude exceeds this are invalid
    pub max_curvature_inv_m: f64,

    /// Paths longer than this are invalid
    pub max_path_length_m: f64,

    /// Maximum distance between the end of a path and its goal
    pub goal_tolerance_m: f64,

    /// Maximum heading difference between the end of a path and its goal
    pub goal_heading_tolerance_rad: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CollisionParams {
    /// Offsets of the footprint circles along the path heading
    pub circle_offsets_m: Vec<f64>,

    /// Radii of the footprint circles, one per offset
    pub circle_radii_m: Vec<f64>,

    /// Weight of the distance from the centre path when scoring paths
    pub path_select_weight: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct VelocityParams {
    /// Maximum acceleration magnitude used when ramping speeds
    pub a_max_mss: f64,

    /// Speed the vehicle creeps at when approaching a stop from standstill
    pub slow_speed_ms: f64,

    /// Following time gap to a lead vehicle
    pub time_gap_s: f64,

    /// A stop profile creeps forward while the path is longer than this.
    ///
    /// Must match the behavioural planner's arrival tolerance, otherwise a
    /// vehicle can come to rest short of the goal and never arrive.
    pub stop_position_tolerance_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PathGenParams {
    fn default() -> Self {
        Self {
            num_paths: 7,
            path_offset_m: 1.5,
            path_step_m: 0.5,
            max_curvature_inv_m: 0.5,
            max_path_length_m: 100.0,
            goal_tolerance_m: 0.1,
            goal_heading_tolerance_rad: 0.05,
        }
    }
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self {
            circle_offsets_m: vec![-1.0, 1.0, 3.0],
            circle_radii_m: vec![1.5, 1.5, 1.5],
            path_select_weight: 10.0,
        }
    }
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            a_max_mss: 2.5,
            slow_speed_ms: 2.0,
            time_gap_s: 1.0,
            stop_position_tolerance_m: 3.0,
        }
    }
}
