//! # Trajectory controllers module
//!
//! This module provides the controllers used for TrajCtrl, including their
//! error calculations.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Vector3;
use serde::Serialize;
use sim_if::ctrl::VehicleControl;
use util::maths::{lin_map, poly_val, wrap_to_pi};

// Internal
use super::{StatusReport, TrajCtrlParams};
use crate::auto::{loc::Pose, path::PathSegment};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A PID controller
#[derive(Debug, Serialize, Clone)]
pub struct PidController {
    /// Proportional gain
    k_p: f64,

    /// Integral gain
    k_i: f64,

    /// Dervative gain
    k_d: f64,

    /// Previous error
    prev_error: Option<f64>,

    /// The integral accumulation
    integral: f64,

    /// Bound on the magnitude of the integral accumulation
    integral_limit: f64,
}

/// The trajectory controllers
#[derive(Debug, Serialize, Clone)]
pub struct TrajControllers {
    /// Speed error controller
    long_ctrl: PidController,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PidController {
    /// Create a new controller with the given gains.
    ///
    /// The integral accumulation is clamped to `[-integral_limit,
    /// integral_limit]`.
    pub fn new(k_p: f64, k_i: f64, k_d: f64, integral_limit: f64) -> Self {
        Self {
            k_p,
            k_i,
            k_d,
            integral: 0f64,
            integral_limit: integral_limit.abs(),
            prev_error: None,
        }
    }

    /// Get the value of the controller for the given error.
    ///
    /// `dt_s` is the time since the previous call, taken from the
    /// measurement timestamps. If it is `None` (the first call, or a repeated
    /// timestamp) no integral is accumulated and no derivative is applied.
    pub fn get(&mut self, error: f64, dt_s: Option<f64>) -> f64 {
        // Only accumulate and differentiate over a real time step, otherwise
        // the derivative would spike
        let dt_s = dt_s.filter(|&t| t > 0.0);

        if let Some(t) = dt_s {
            self.integral =
                (self.integral + error * t).clamp(-self.integral_limit, self.integral_limit);
        }

        let deriv = match (self.prev_error, dt_s) {
            (Some(e), Some(t)) => (error - e) / t,
            _ => 0f64,
        };

        // Calculate the output
        let out = self.k_p * error + self.k_i * self.integral + self.k_d * deriv;

        // Remember the previous error
        self.prev_error = Some(error);

        out
    }

    /// Clear the integral and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0f64;
        self.prev_error = None;
    }
}

impl TrajControllers {
    /// Create a new instance of the controllers from the parameters
    pub fn new(params: &TrajCtrlParams) -> Self {
        Self {
            long_ctrl: PidController::new(
                params.long_k_p,
                params.long_k_i,
                params.long_k_d,
                params.long_i_limit,
            ),
        }
    }

    /// Clear the controller memory, for when the vehicle is held regardless
    /// of the commands.
    pub fn reset(&mut self) {
        self.long_ctrl.reset();
    }

    /// Get the actuation command for tracking the reference segment at the
    /// reference speed.
    #[allow(clippy::too_many_arguments)]
    pub fn get_control(
        &mut self,
        segment: Option<&PathSegment>,
        pose: &Pose,
        speed_ms: f64,
        ref_speed_ms: f64,
        dt_s: Option<f64>,
        report: &mut StatusReport,
        params: &TrajCtrlParams,
    ) -> VehicleControl {
        // ---- LATERAL ----

        let (lat_err_m, head_err_rad) = match segment {
            Some(s) => (self.calc_lat_error(s, pose), self.calc_head_error(s, pose)),
            None => (0f64, 0f64),
        };
        report.lat_error_m = lat_err_m;
        report.head_error_rad = head_err_rad;

        // Stanley law. The lateral error is positive to the left of the
        // segment, where steering right (negative) is needed.
        let steer_rad = (head_err_rad
            + (-params.stanley_k_e * lat_err_m).atan2(params.stanley_k_soft_ms + speed_ms.abs()))
        .clamp(-params.max_steer_rad, params.max_steer_rad);

        let steer = lin_map(
            (-params.max_steer_rad, params.max_steer_rad),
            (-1f64, 1f64),
            steer_rad,
        );

        // ---- LONGITUDINAL ----

        let speed_err_ms = ref_speed_ms - speed_ms;
        report.speed_error_ms = speed_err_ms;

        let effort = self.long_ctrl.get(speed_err_ms, dt_s) + poly_val(ref_speed_ms, &params.speed_ff_coeffs);

        VehicleControl {
            throttle: positive_part(effort),
            steer,
            brake: positive_part(-effort * params.brake_gain),
        }
        .clamped()
    }

    /// Calculate the lateral error to the segment.
    ///
    /// Lateral error will be positive if the vehicle is to the "left" of the
    /// segment, and negative if it's to the right (following right hand
    /// rule).
    fn calc_lat_error(&self, segment: &PathSegment, pose: &Pose) -> f64 {
        // The z component of the cross product of the segment direction and
        // the start->vehicle vector is the signed distance to the line, as
        // the direction is a unit vector.
        let cross = Vector3::new(segment.direction[0], segment.direction[1], 0.0).cross(
            &Vector3::new(
                pose.position_m[0] - segment.start_m[0],
                pose.position_m[1] - segment.start_m[1],
                0.0,
            ),
        );

        cross[2]
    }

    /// Calculate the heading error to the segment
    ///
    /// The heading error is +ve if the vehicle is pointing to the right of
    /// the segment, and negative if it's pointing to the left (right hand
    /// rule about Z)
    fn calc_head_error(&self, segment: &PathSegment, pose: &Pose) -> f64 {
        wrap_to_pi(segment.heading_rad - pose.heading_rad)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// `x` if it is positive, otherwise `+0.0` (never `-0.0`).
fn positive_part(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}
