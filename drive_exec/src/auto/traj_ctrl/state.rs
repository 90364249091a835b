//! Trajectory control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::debug;
use nalgebra::Vector2;
use serde::Serialize;
use sim_if::ctrl::VehicleControl;

// Internal
use super::*;
use crate::auto::{
    loc::Pose,
    path::{segment_between, PathSegment, ProfilePoint},
};
use util::{module::State, params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

pub struct TrajCtrl {
    params: TrajCtrlParams,

    /// The reference to track, each point carrying its speed demand
    waypoints: Vec<ProfilePoint>,

    /// The most recent vehicle state
    vehicle: Option<VehicleState>,

    /// Timestamp of the previous vehicle state
    prev_timestamp_s: Option<f64>,

    /// Time between the previous and current vehicle states
    dt_s: Option<f64>,

    /// Controller objects used to calculate the commands
    controllers: TrajControllers,

    commands: VehicleControl,
    report: StatusReport,
}

/// The measured state of the vehicle used by the controllers.
#[derive(Debug, Copy, Clone, Default, Serialize)]
pub struct VehicleState {
    pub pose: Pose,
    pub speed_ms: f64,
    pub timestamp_s: f64,
    pub frame: u64,
}

/// The status report containing the tracking errors for the current tick.
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// The lateral error to the current reference segment
    pub lat_error_m: f64,

    /// The heading error to the current reference segment
    pub head_error_rad: f64,

    /// The difference between the reference and measured speed
    pub speed_error_ms: f64,

    /// Index of the reference point nearest the vehicle
    pub ref_index: usize,

    /// The speed demand being tracked
    pub ref_speed_ms: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during processing of the module.
#[derive(Debug, thiserror::Error)]
pub enum TrajCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    /// Attempted to compute controls before any reference was set.
    #[error("No reference waypoints have been set")]
    NoWaypoints,

    /// Attempted to compute controls before the vehicle state was set.
    #[error("No vehicle state has been set")]
    NoVehicleState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajCtrl {
    pub fn new(params: TrajCtrlParams) -> Self {
        let controllers = TrajControllers::new(&params);

        Self {
            params,
            waypoints: vec![],
            vehicle: None,
            prev_timestamp_s: None,
            dt_s: None,
            controllers,
            commands: VehicleControl::default(),
            report: StatusReport::default(),
        }
    }

    /// Replace the reference being tracked.
    pub fn update_waypoints(&mut self, waypoints: Vec<ProfilePoint>) {
        self.waypoints = waypoints;
    }

    pub fn waypoints(&self) -> &[ProfilePoint] {
        &self.waypoints
    }

    /// Set the measured vehicle state for this tick.
    ///
    /// The time step used by the controllers is derived from the difference
    /// to the previous timestamp.
    pub fn update_values(
        &mut self,
        x_m: f64,
        y_m: f64,
        yaw_rad: f64,
        speed_ms: f64,
        timestamp_s: f64,
        frame: u64,
    ) {
        self.dt_s = self
            .prev_timestamp_s
            .map(|t| timestamp_s - t)
            .filter(|&dt| dt > 0.0);
        self.prev_timestamp_s = Some(timestamp_s);

        self.vehicle = Some(VehicleState {
            pose: Pose::new(x_m, y_m, yaw_rad),
            speed_ms,
            timestamp_s,
            frame,
        });
    }

    /// Compute the commands for the current reference and vehicle state.
    pub fn update_controls(&mut self) -> Result<(), TrajCtrlError> {
        // Validate the inputs
        let vehicle = match self.vehicle {
            Some(v) => v,
            None => return Err(TrajCtrlError::NoVehicleState),
        };
        if self.waypoints.is_empty() {
            return Err(TrajCtrlError::NoWaypoints);
        }

        self.report = StatusReport::default();

        let ref_index = self.nearest_index(&vehicle.pose.position_m);
        let segment = self.reference_segment(ref_index);
        let ref_speed_ms = self.reference_speed(ref_index);

        self.report.ref_index = ref_index;
        self.report.ref_speed_ms = ref_speed_ms;

        self.commands = self.controllers.get_control(
            segment.as_ref(),
            &vehicle.pose,
            vehicle.speed_ms,
            ref_speed_ms,
            self.dt_s,
            &mut self.report,
            &self.params,
        );

        debug!(
            "TrajCtrl frame {}: ref {} at {:.2} m/s, lat err {:.3} m, head err {:.3} rad",
            vehicle.frame,
            ref_index,
            ref_speed_ms,
            self.report.lat_error_m,
            self.report.head_error_rad
        );

        Ok(())
    }

    /// Clear the controller memory.
    ///
    /// Called while something other than the reference holds the vehicle,
    /// so the integral does not wind up against it.
    pub fn reset_controllers(&mut self) {
        self.controllers.reset();
    }

    /// The commands computed by the last call to `update_controls`.
    pub fn get_commands(&self) -> VehicleControl {
        self.commands
    }

    pub fn report(&self) -> StatusReport {
        self.report
    }

    /// Index of the reference point closest to the position.
    fn nearest_index(&self, position_m: &Vector2<f64>) -> usize {
        let mut best = (0, f64::INFINITY);

        for (i, wp) in self.waypoints.iter().enumerate() {
            let dist = (wp.position_m - position_m).norm();
            if dist < best.1 {
                best = (i, dist);
            }
        }

        best.0
    }

    /// The segment leaving the reference point, or arriving at it if the
    /// point is the last one.
    fn reference_segment(&self, index: usize) -> Option<PathSegment> {
        let num = self.waypoints.len();

        if index + 1 < num {
            segment_between(
                &self.waypoints[index].position_m,
                &self.waypoints[index + 1].position_m,
            )
        } else if index > 0 {
            segment_between(
                &self.waypoints[index - 1].position_m,
                &self.waypoints[index].position_m,
            )
        } else {
            None
        }
    }

    /// The speed demand found `speed_lookahead_m` along the reference from
    /// the given index.
    fn reference_speed(&self, index: usize) -> f64 {
        let mut dist_m = 0f64;
        let mut i = index;

        while i + 1 < self.waypoints.len() && dist_m < self.params.speed_lookahead_m {
            dist_m += (self.waypoints[i + 1].position_m - self.waypoints[i].position_m).norm();
            i += 1;
        }

        self.waypoints[i].speed_ms
    }
}

impl State for TrajCtrl {
    type InitData = String;
    type InitError = TrajCtrlError;

    type InputData = VehicleState;
    type OutputData = VehicleControl;
    type StatusReport = StatusReport;
    type ProcError = TrajCtrlError;

    /// Load the parameters from the given file, relative to the parameters
    /// directory, and reset the controllers.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError> {
        let params: TrajCtrlParams =
            params::load(&init_data).map_err(TrajCtrlError::ParamLoadError)?;

        self.controllers = TrajControllers::new(&params);
        self.params = params;
        self.prev_timestamp_s = None;
        self.dt_s = None;

        Ok(())
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.update_values(
            input_data.pose.position_m[0],
            input_data.pose.position_m[1],
            input_data.pose.heading_rad,
            input_data.speed_ms,
            input_data.timestamp_s,
            input_data.frame,
        );

        self.update_controls()?;

        Ok((self.commands, self.report))
    }
}
