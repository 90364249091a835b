//! # DriveMgr module
//!
//! The [`DriveMgr`] runs the autonomy data flow once per control tick. Every
//! `lp_frequency_divisor` ticks it plans:
//!
//! 1. Estimate the ego speed open loop from the last speed profile.
//! 2. Set the behaviour planner's lookahead and step its state machine with
//!    the traffic light observation.
//! 3. Extract obstacles from the agents and check for a lead vehicle.
//! 4. Generate candidate paths, check them for collisions and select the
//!    best one, falling back to the previous best path.
//! 5. Apply the safety rules, which may raise the emergency flags.
//! 6. Compute the speed profile and hand the interpolated reference to
//!    trajectory control.
//!
//! On every tick trajectory control tracks the current reference. The
//! handbrake flag overrides its commands with a full brake.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;

use log::{debug, info, trace};
use serde::Serialize;
use sim_if::{ctrl::VehicleControl, meas::Measurement};
use util::maths::abs_ang_dist;

pub use self::params::DriveMgrParams;

use super::{
    behav_plan::{BehaviourState, BehaviouralPlanner, IntentFlags},
    geom::interpolate_profile,
    loc::{EgoState, Pose},
    local_plan::{LocalPlanError, LocalPlanner},
    per::{observe_traffic_light, sort_agents, TrafficLightDetector},
    route::{Region, Route},
    safety,
    traj_ctrl::{TrajCtrl, TrajCtrlError, TrajCtrlParams},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Drive Manager
///
/// Owns the route and all autonomy modules for a single drive.
pub struct DriveMgr<D: TrafficLightDetector> {
    pub params: DriveMgrParams,

    route: Route,

    /// Intersection regions of the route, computed once
    regions: Vec<Region>,

    behav_planner: BehaviouralPlanner,
    local_planner: LocalPlanner,
    traj_ctrl: TrajCtrl,
    detector: D,

    /// Number of control ticks stepped so far
    num_ticks: u64,

    /// Timestamp of the last planning tick
    last_plan_time_s: Option<f64>,

    /// Headings at recent planning ticks, most recent last
    heading_history: VecDeque<f64>,

    /// Index of the path selected at the last planning tick
    best_index: Option<usize>,

    mission_complete: bool,
}

/// Output of a single control tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DriveOutput {
    /// The command to send to the vehicle
    pub control: VehicleControl,

    pub flags: IntentFlags,

    pub state: BehaviourState,

    /// The path selected at the last planning tick, `None` if the previous
    /// best path was used
    pub best_index: Option<usize>,

    /// True if planning ran this tick
    pub planned: bool,

    pub mission_complete: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors that can occur in the drive manager.
#[derive(Debug, thiserror::Error)]
pub enum DriveMgrError {
    #[error("The planning frequency divisor must be at least 1")]
    InvalidDivisor,

    #[error("Error in local planning: {0}")]
    LocalPlanError(LocalPlanError),

    #[error("Error in TrajCtrl: {0}")]
    TrajCtrlError(TrajCtrlError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<D: TrafficLightDetector> DriveMgr<D> {
    /// Create a new manager for driving the given route.
    ///
    /// Fails if the configuration of the local planner is inconsistent.
    pub fn new(
        mut params: DriveMgrParams,
        traj_ctrl_params: TrajCtrlParams,
        route: Route,
        detector: D,
    ) -> Result<Self, DriveMgrError> {
        if params.lp_frequency_divisor == 0 {
            return Err(DriveMgrError::InvalidDivisor);
        }

        // Creeping to a stop ends exactly where arrival is declared
        params.local_plan.velocity.stop_position_tolerance_m =
            params.behav.stop_position_tolerance_m;

        let local_planner =
            LocalPlanner::new(&params.local_plan).map_err(DriveMgrError::LocalPlanError)?;

        let mut behav_planner = BehaviouralPlanner::new(params.behav.clone());
        behav_planner.set_lookahead(params.lookahead_base_m);

        let regions = route.intersection_regions(params.intersection_half_size_m);

        info!(
            "DriveMgr initialised: {} waypoints, {} intersections",
            route.len(),
            regions.len()
        );

        Ok(Self {
            heading_history: VecDeque::with_capacity(params.heading_history_len),
            params,
            route,
            regions,
            behav_planner,
            local_planner,
            traj_ctrl: TrajCtrl::new(traj_ctrl_params),
            detector,
            num_ticks: 0,
            last_plan_time_s: None,
            best_index: None,
            mission_complete: false,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn behav_planner(&self) -> &BehaviouralPlanner {
        &self.behav_planner
    }

    pub fn local_planner(&self) -> &LocalPlanner {
        &self.local_planner
    }

    pub fn traj_ctrl(&self) -> &TrajCtrl {
        &self.traj_ctrl
    }

    pub fn is_mission_complete(&self) -> bool {
        self.mission_complete
    }

    /// Step the manager for one control tick.
    ///
    /// `frame` is given to the traffic light detector on planning ticks.
    pub fn step(
        &mut self,
        meas: &Measurement,
        frame: &D::Frame,
    ) -> Result<DriveOutput, DriveMgrError> {
        let pose = Pose::from(&meas.player);

        let planned = self.num_ticks % self.params.lp_frequency_divisor as u64 == 0;
        if planned {
            self.plan(meas, &pose, frame);
        }
        self.num_ticks += 1;

        // ---- CONTROL ----

        self.traj_ctrl.update_values(
            pose.position_m[0],
            pose.position_m[1],
            pose.heading_rad,
            meas.player.forward_speed_ms,
            meas.timestamp_s,
            meas.frame,
        );

        let mut control = if self.traj_ctrl.waypoints().is_empty() {
            VehicleControl::full_brake()
        } else {
            self.traj_ctrl
                .update_controls()
                .map_err(DriveMgrError::TrajCtrlError)?;
            self.traj_ctrl.get_commands()
        };

        let flags = self.behav_planner.flags();
        if flags.handbrake {
            self.traj_ctrl.reset_controllers();
            control.throttle = 0.0;
            control.brake = 1.0;
        }

        // ---- MISSION ----

        let dist_to_end_m = (self.route.last().position_m - pose.position_m).norm();
        if !self.mission_complete && dist_to_end_m < self.params.mission_complete_distance_m {
            info!("Mission complete at frame {}", meas.frame);
            self.mission_complete = true;
        }
        if self.mission_complete {
            control = VehicleControl::full_brake();
        }

        trace!(
            "Frame {}: throttle {:.3}, steer {:.3}, brake {:.3}",
            meas.frame,
            control.throttle,
            control.steer,
            control.brake
        );

        Ok(DriveOutput {
            control,
            flags,
            state: self.behav_planner.state(),
            best_index: self.best_index,
            planned,
            mission_complete: self.mission_complete,
        })
    }

    /// Run one planning tick.
    fn plan(&mut self, meas: &Measurement, pose: &Pose, frame: &D::Frame) {
        let measured_speed_ms = meas.player.forward_speed_ms;
        let extent = &meas.player.extent;

        // Open loop speed estimate since the last planning tick
        let elapsed_s = self
            .last_plan_time_s
            .map(|t| meas.timestamp_s - t)
            .unwrap_or(0.0);
        let open_loop_speed_ms = self
            .local_planner
            .velocity_planner
            .get_open_loop_speed(elapsed_s)
            .unwrap_or(measured_speed_ms);
        self.last_plan_time_s = Some(meas.timestamp_s);

        let ego = EgoState {
            pose: *pose,
            speed_ms: open_loop_speed_ms,
        };

        self.push_heading(pose.heading_rad);

        // ---- BEHAVIOUR ----

        let in_intersection = safety::in_intersection(pose, extent, &self.regions);
        let lookahead_m = if in_intersection {
            self.params.intersection_lookahead_m
        } else {
            self.params.lookahead_base_m + self.params.lookahead_time_s * open_loop_speed_ms
        };
        self.behav_planner.set_lookahead(lookahead_m);
        self.behav_planner.reset_emergency_flags();

        let tl = observe_traffic_light(&mut self.detector, frame, self.params.per.no_light_depth_m);

        // The stopped check uses the measured speed
        let measured_ego = EgoState {
            pose: *pose,
            speed_ms: measured_speed_ms,
        };
        let state = self
            .behav_planner
            .transition_state(&self.route, &measured_ego, tl.depth_m, tl.label);

        // ---- OBSTACLES ----

        let agents = sort_agents(pose, &meas.agents, &self.params.per);
        let lead_position_m = agents.lead_candidate().map(|v| v.position_m);
        let following = self
            .behav_planner
            .check_for_lead_vehicle(&ego, lead_position_m.as_ref());
        let lead = if following {
            agents.lead_vehicle()
        } else {
            None
        };

        // ---- CANDIDATE PATHS ----

        let goal_state = *self.behav_planner.goal_state();
        let lp = &mut self.local_planner;

        let goal_set = lp.path_generator.get_goal_state_set(
            self.behav_planner.goal_index(),
            &goal_state,
            &self.route,
            &ego,
        );
        let local_paths = lp.path_generator.plan_paths(&goal_set);
        let paths = lp.path_generator.transform_paths(&local_paths, &ego);

        let pedestrian_free = lp
            .collision_checker
            .collision_check_pedestrian(&paths, &agents.pedestrian_points_m);
        let vehicle_free = lp
            .collision_checker
            .collision_check(&paths, &agents.vehicle_points(following));

        let (best_index, best_path) = lp.select_path(&paths, &vehicle_free, &goal_state);
        self.best_index = best_index;

        // ---- SAFETY ----

        let driving_straight = self.is_driving_straight();
        let flags = self.behav_planner.flags_mut();
        let safety_params = &self.params.safety;

        safety::predict_pedestrian_collisions(
            &pedestrian_free,
            &paths.valid,
            &agents.pedestrians,
            &ego,
            flags,
            safety_params,
        );
        safety::check_intersection_collisions(
            &vehicle_free,
            &paths.valid,
            in_intersection,
            flags,
            safety_params,
        );
        safety::emergency_brake_pedestrian(
            &ego,
            extent,
            &agents.pedestrians,
            driving_straight,
            flags,
            safety_params,
        );
        if let Some(l) = lead.as_ref() {
            safety::check_lead_vehicle_distance(&ego, l, flags, safety_params);
        }
        let flags = *flags;

        // ---- VELOCITY ----

        let profile = self.local_planner.velocity_planner.compute_velocity_profile(
            best_path.as_ref(),
            goal_state.speed_ms,
            &ego,
            measured_speed_ms,
            state.is_stopping(),
            lead.as_ref(),
            flags.follow_lead_vehicle,
            flags.handbrake,
        );

        match profile {
            Some(p) => self
                .traj_ctrl
                .update_waypoints(interpolate_profile(&p, self.params.interp_resolution_m)),
            None => debug!("No path to profile, keeping the previous reference"),
        }

        debug!(
            "Plan frame {}: {:?}, lookahead {:.1} m, best path {:?}, {:?}",
            meas.frame, state, lookahead_m, best_index, flags
        );
    }

    fn push_heading(&mut self, heading_rad: f64) {
        if self.heading_history.len() >= self.params.heading_history_len {
            self.heading_history.pop_front();
        }
        self.heading_history.push_back(heading_rad);
    }

    /// True if the history is full and every heading in it is close to the
    /// latest one.
    fn is_driving_straight(&self) -> bool {
        let latest = match self.heading_history.back() {
            Some(h) => *h,
            None => return false,
        };

        self.heading_history.len() >= self.params.heading_history_len
            && self
                .heading_history
                .iter()
                .all(|h| abs_ang_dist(*h, latest) <= self.params.straight_heading_tolerance_rad)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto::{per::NoTrafficLight, route::Waypoint};
    use sim_if::meas::{Extent, PlayerMeasurement};

    fn straight_route() -> Route {
        Route::new((0..100).map(|i| Waypoint::new(i as f64, 0.0, 5.0)).collect()).unwrap()
    }

    fn meas(x_m: f64, speed_ms: f64, timestamp_s: f64, frame: u64) -> Measurement {
        Measurement {
            timestamp_s,
            frame,
            player: PlayerMeasurement {
                x_m,
                y_m: 0.0,
                yaw_rad: 0.0,
                forward_speed_ms: speed_ms,
                extent: Extent { x_m: 2.0, y_m: 1.0 },
            },
            agents: vec![],
            traffic_light: None,
        }
    }

    fn mgr() -> DriveMgr<NoTrafficLight> {
        DriveMgr::new(
            DriveMgrParams::default(),
            TrajCtrlParams::default(),
            straight_route(),
            NoTrafficLight,
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config() {
        let mut params = DriveMgrParams::default();
        params.lp_frequency_divisor = 0;
        assert!(matches!(
            DriveMgr::new(params, TrajCtrlParams::default(), straight_route(), NoTrafficLight),
            Err(DriveMgrError::InvalidDivisor)
        ));

        let mut params = DriveMgrParams::default();
        params.local_plan.path_gen.num_paths = 4;
        assert!(matches!(
            DriveMgr::new(params, TrajCtrlParams::default(), straight_route(), NoTrafficLight),
            Err(DriveMgrError::LocalPlanError(_))
        ));
    }

    #[test]
    fn test_planning_cadence() {
        let mut dm = mgr();

        let planned: Vec<bool> = (0..5)
            .map(|i| dm.step(&meas(0.0, 0.0, i as f64 * 0.1, i), &()).unwrap().planned)
            .collect();

        assert_eq!(planned, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_drive_off() {
        let mut dm = mgr();
        let out = dm.step(&meas(0.0, 0.0, 0.0, 0), &()).unwrap();

        assert_eq!(out.state, BehaviourState::FollowLane);
        assert_eq!(out.best_index, Some(3));
        assert!(!out.flags.handbrake);
        assert!(out.control.throttle > 0.0);
        assert!(out.control.brake < 1e-9);
        assert!(!out.mission_complete);
    }

    #[test]
    fn test_mission_complete() {
        let mut dm = mgr();
        let out = dm.step(&meas(98.5, 0.5, 0.0, 0), &()).unwrap();

        assert!(out.mission_complete);
        assert_eq!(out.control, VehicleControl::full_brake());
    }

    #[test]
    fn test_driving_straight() {
        let mut dm = mgr();
        assert!(!dm.is_driving_straight());

        for _ in 0..dm.params.heading_history_len {
            dm.push_heading(0.01);
        }
        assert!(dm.is_driving_straight());

        dm.push_heading(0.5);
        assert!(!dm.is_driving_straight());
    }
}
