//! Trajectory control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for trajectory control
#[derive(Deserialize, Debug, Clone)]
pub struct TrajCtrlParams {
    /// Longitudinal controller proportional gain
    pub long_k_p: f64,

    /// Longitudinal controller integral gain
    pub long_k_i: f64,

    /// Longitudinal controller derivative gain
    pub long_k_d: f64,

    /// Limit on the magnitude of the longitudinal integral accumulation
    pub long_i_limit: f64,

    /// Reference speed to throttle feed-forward coefficients
    ///
    /// The order of these coefficients is highest power first, i.e if there
    /// are 3 coefficients it's a 2nd order polynomial with c[0]*x^2 + c[1]*x
    /// + c[2].
    pub speed_ff_coeffs: Vec<f64>,

    /// Gain applied to negative longitudinal effort to get the brake demand
    pub brake_gain: f64,

    /// Distance along the reference from the nearest point at which the
    /// speed demand is read
    pub speed_lookahead_m: f64,

    /// Stanley cross track error gain
    pub stanley_k_e: f64,

    /// Stanley softening speed, keeps the cross track term bounded at low
    /// speed
    pub stanley_k_soft_ms: f64,

    /// Steering angle which maps to a full steer demand
    pub max_steer_rad: f64,
}

impl Default for TrajCtrlParams {
    fn default() -> Self {
        Self {
            long_k_p: 0.5,
            long_k_i: 0.05,
            long_k_d: 0.0,
            long_i_limit: 10.0,
            speed_ff_coeffs: vec![0.07, 0.0],
            brake_gain: 1.0,
            speed_lookahead_m: 1.0,
            stanley_k_e: 0.5,
            stanley_k_soft_ms: 1.0,
            max_steer_rad: 1.22,
        }
    }
}
