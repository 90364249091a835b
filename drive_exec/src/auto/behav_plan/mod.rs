//! # Behavioural planning module
//!
//! The behavioural planner turns the route, the ego state and the traffic
//! light observation into a discrete driving intent ([`BehaviourState`]) and
//! a goal state for the local planner to aim at.
//!
//! The states are:
//!
//! - `FollowLane` - drive along the route, the goal is the waypoint one
//!   lookahead distance ahead, at the route's target speed.
//! - `DecelerateToStop` - a stop line (with a red light, or without any
//!   light) or the end of the route lies within the lookahead. The goal is
//!   held just before it with zero speed.
//! - `StayStopped` - the vehicle has stopped at the stop goal. After a
//!   number of ticks it resumes once the light is not red. It never resumes
//!   at the end of the route.
//! - `TrafficLightStop` - a red light with no known stop line. The goal is
//!   placed in front of the light, and the vehicle only resumes on an
//!   explicit green.
//!
//! The planner also owns the [`IntentFlags`]. The emergency flags are
//! written by the safety rules each tick, the lead vehicle flag is decided
//! here with hysteresis.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info};
use nalgebra::Vector2;
use serde::Serialize;
use sim_if::tl::TrafficLightLabel;
use util::maths::abs_ang_dist;

pub use params::BehavPlanParams;

use super::{
    loc::EgoState,
    route::{Route, RoutePoint},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Desired pose and speed at the local planning horizon.
#[derive(Debug, Copy, Clone, Default, Serialize, PartialEq)]
pub struct GoalState {
    pub position_m: Vector2<f64>,
    pub heading_rad: f64,
    pub speed_ms: f64,
}

/// Boolean intents raised during a planning tick.
#[derive(Debug, Copy, Clone, Default, Serialize, PartialEq)]
pub struct IntentFlags {
    /// Emergency stop, overrides the controller commands
    pub handbrake: bool,

    /// A pedestrian is in danger of being hit
    pub obstacle: bool,

    /// A lead vehicle is being followed
    pub follow_lead_vehicle: bool,
}

pub struct BehaviouralPlanner {
    params: BehavPlanParams,

    /// Arc length horizon used to pick the goal waypoint
    lookahead_m: f64,

    state: BehaviourState,

    goal_index: usize,
    goal_state: GoalState,

    flags: IntentFlags,

    /// What the current stop (if any) is for
    stop_reason: Option<StopReason>,

    /// Number of ticks spent in `StayStopped`
    stop_count: usize,

    /// Index of the last stop line the vehicle stopped at and moved on from
    served_stop_index: Option<usize>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, Serialize, PartialEq, Eq)]
pub enum BehaviourState {
    FollowLane,
    DecelerateToStop,
    StayStopped,
    TrafficLightStop,
}

/// The reason the vehicle is stopping.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The stop line at the given route index
    StopLine(usize),
    TrafficLight,
    RouteEnd,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for BehaviourState {
    fn default() -> Self {
        BehaviourState::FollowLane
    }
}

impl BehaviourState {
    /// True in all states which hold a zero speed goal.
    pub fn is_stopping(&self) -> bool {
        !matches!(self, BehaviourState::FollowLane)
    }
}

impl BehaviouralPlanner {
    pub fn new(params: BehavPlanParams) -> Self {
        Self {
            params,
            lookahead_m: 0.0,
            state: BehaviourState::FollowLane,
            goal_index: 0,
            goal_state: GoalState::default(),
            flags: IntentFlags::default(),
            stop_reason: None,
            stop_count: 0,
            served_stop_index: None,
        }
    }

    pub fn set_lookahead(&mut self, lookahead_m: f64) {
        self.lookahead_m = lookahead_m;
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead_m
    }

    pub fn state(&self) -> BehaviourState {
        self.state
    }

    pub fn goal_index(&self) -> usize {
        self.goal_index
    }

    pub fn goal_state(&self) -> &GoalState {
        &self.goal_state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn flags(&self) -> IntentFlags {
        self.flags
    }

    /// Mutable access to the flags for the safety rules.
    pub fn flags_mut(&mut self) -> &mut IntentFlags {
        &mut self.flags
    }

    /// Clear the emergency flags ready for a new planning tick.
    ///
    /// The lead vehicle flag is kept, it is updated by
    /// [`BehaviouralPlanner::check_for_lead_vehicle`].
    pub fn reset_emergency_flags(&mut self) {
        self.flags.handbrake = false;
        self.flags.obstacle = false;
    }

    /// Step the state machine.
    ///
    /// `tl_depth_m` is the distance to the observed traffic light, which
    /// should be a large value if there is no light.
    pub fn transition_state(
        &mut self,
        route: &Route,
        ego: &EgoState,
        tl_depth_m: f64,
        tl_label: TrafficLightLabel,
    ) -> BehaviourState {
        let prev_state = self.state;

        match self.state {
            BehaviourState::FollowLane => self.follow_lane(route, ego, tl_depth_m, tl_label),
            BehaviourState::DecelerateToStop => {
                let green_at_line = matches!(self.stop_reason, Some(StopReason::StopLine(_)))
                    && tl_label == TrafficLightLabel::Go;

                if green_at_line {
                    self.resume(route, ego, tl_depth_m, tl_label);
                } else if self.is_stopped_at_goal(ego) {
                    self.state = BehaviourState::StayStopped;
                    self.stop_count = 0;
                }
            }
            BehaviourState::StayStopped => {
                self.stop_count += 1;

                let can_resume = self.stop_reason != Some(StopReason::RouteEnd)
                    && self.stop_count >= self.params.stop_hold_ticks
                    && tl_label != TrafficLightLabel::Stop;

                if can_resume {
                    self.resume(route, ego, tl_depth_m, tl_label);
                }
            }
            BehaviourState::TrafficLightStop => {
                if tl_label == TrafficLightLabel::Go {
                    self.resume(route, ego, tl_depth_m, tl_label);
                }
            }
        }

        if prev_state != self.state {
            info!(
                "Behaviour {:?} -> {:?}, goal index {} speed {:.2} m/s",
                prev_state, self.state, self.goal_index, self.goal_state.speed_ms
            );
        }

        self.state
    }

    /// Update the lead vehicle flag for the given candidate position.
    ///
    /// A candidate is picked up once it is ahead of the ego within
    /// `lead_activation_m`. Once following, it is only dropped when it is
    /// further than `lead_lookahead_m` or no longer ahead.
    pub fn check_for_lead_vehicle(
        &mut self,
        ego: &EgoState,
        candidate_m: Option<&Vector2<f64>>,
    ) -> bool {
        let candidate_m = match candidate_m {
            Some(c) => c,
            None => {
                self.flags.follow_lead_vehicle = false;
                return false;
            }
        };

        let delta = candidate_m - ego.position2();
        let dist_m = delta.norm();
        let ahead = abs_ang_dist(delta.y.atan2(delta.x), ego.heading())
            <= self.params.lead_heading_tolerance_rad;

        let follow = if self.flags.follow_lead_vehicle {
            ahead && dist_m <= self.params.lead_lookahead_m
        } else {
            ahead && dist_m < self.params.lead_activation_m
        };

        if follow != self.flags.follow_lead_vehicle {
            debug!("Follow lead vehicle: {} (distance {:.2} m)", follow, dist_m);
        }

        self.flags.follow_lead_vehicle = follow;
        follow
    }

    fn follow_lane(
        &mut self,
        route: &Route,
        ego: &EgoState,
        tl_depth_m: f64,
        tl_label: TrafficLightLabel,
    ) {
        let closest = route.closest_index(&ego.position2());
        let goal_index = self.get_goal_index(route, ego, closest);

        // Stop lines already stopped at are ignored
        let search_from = match self.served_stop_index {
            Some(s) => closest.max(s + 1),
            None => closest,
        };

        let red_light = tl_label == TrafficLightLabel::Stop
            && tl_depth_m <= self.params.traffic_light_stop_depth_m;

        match route.stop_line_between(search_from, goal_index) {
            // A stop line without any light is treated as a stop sign
            Some(stop_index) if red_light || tl_label == TrafficLightLabel::None => {
                let dist_m = route.arc_length(closest, stop_index) - self.params.stop_line_buffer_m;
                self.set_stop_goal(
                    route.point_at_distance(closest, dist_m),
                    StopReason::StopLine(stop_index),
                    BehaviourState::DecelerateToStop,
                );
                return;
            }
            Some(_) => (),
            None if red_light => {
                self.set_stop_goal(
                    route.point_at_distance(closest, tl_depth_m - self.params.stop_line_buffer_m),
                    StopReason::TrafficLight,
                    BehaviourState::TrafficLightStop,
                );
                return;
            }
            None => (),
        }

        if goal_index == route.last_index() {
            let last = route.last_index();
            self.set_stop_goal(
                RoutePoint {
                    position_m: route.last().position_m,
                    heading_rad: route.heading_at(last),
                    index: last,
                },
                StopReason::RouteEnd,
                BehaviourState::DecelerateToStop,
            );
            return;
        }

        let goal = &route.waypoints()[goal_index];
        self.goal_index = goal_index;
        self.goal_state = GoalState {
            position_m: goal.position_m,
            heading_rad: route.heading_at(goal_index),
            speed_ms: goal.speed_ms,
        };
    }

    /// Leave the current stop and go back to following the lane.
    fn resume(
        &mut self,
        route: &Route,
        ego: &EgoState,
        tl_depth_m: f64,
        tl_label: TrafficLightLabel,
    ) {
        if let Some(StopReason::StopLine(i)) = self.stop_reason {
            self.served_stop_index = Some(i);
        }

        self.stop_reason = None;
        self.stop_count = 0;
        self.state = BehaviourState::FollowLane;

        self.follow_lane(route, ego, tl_depth_m, tl_label);
    }

    fn set_stop_goal(&mut self, point: RoutePoint, reason: StopReason, state: BehaviourState) {
        self.goal_index = point.index;
        self.goal_state = GoalState {
            position_m: point.position_m,
            heading_rad: point.heading_rad,
            speed_ms: 0.0,
        };
        self.stop_reason = Some(reason);
        self.stop_count = 0;
        self.state = state;
    }

    fn is_stopped_at_goal(&self, ego: &EgoState) -> bool {
        ego.speed_ms.abs() < self.params.stop_threshold_ms
            && (ego.position2() - self.goal_state.position_m).norm()
                < self.params.stop_position_tolerance_m
    }

    /// Walk along the route from the closest waypoint until the lookahead
    /// is used up.
    fn get_goal_index(&self, route: &Route, ego: &EgoState, closest: usize) -> usize {
        let wps = route.waypoints();
        let mut arc_m = (wps[closest].position_m - ego.position2()).norm();
        let mut index = closest;

        while index < route.last_index() && arc_m < self.lookahead_m {
            arc_m += (wps[index + 1].position_m - wps[index].position_m).norm();
            index += 1;
        }

        index
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auto::route::{Waypoint, WaypointMarker};
    use assert_approx_eq::assert_approx_eq;

    const NO_LIGHT_M: f64 = 1000.0;

    fn route(len: usize, stop_line: Option<usize>) -> Route {
        let mut wps: Vec<Waypoint> = (0..len)
            .map(|i| Waypoint::new(i as f64 * 5.0, 0.0, 5.0))
            .collect();
        if let Some(s) = stop_line {
            wps[s].marker = WaypointMarker::StopLine;
        }
        Route::new(wps).unwrap()
    }

    fn planner(lookahead_m: f64) -> BehaviouralPlanner {
        let mut bp = BehaviouralPlanner::new(BehavPlanParams::default());
        bp.set_lookahead(lookahead_m);
        bp
    }

    fn assert_goal_speed_invariant(bp: &BehaviouralPlanner, route: &Route) {
        if bp.state().is_stopping() {
            assert_eq!(bp.goal_state().speed_ms, 0.0);
        } else {
            assert_eq!(
                bp.goal_state().speed_ms,
                route.get(bp.goal_index()).unwrap().speed_ms
            );
        }
    }

    #[test]
    fn test_follow_lane_goal() {
        let route = route(21, None);
        let mut bp = planner(16.0);

        let state = bp.transition_state(
            &route,
            &EgoState::new(0.0, 0.0, 0.0, 5.0),
            NO_LIGHT_M,
            TrafficLightLabel::None,
        );

        assert_eq!(state, BehaviourState::FollowLane);
        assert_eq!(bp.goal_index(), 4);
        assert_approx_eq!(bp.goal_state().position_m.x, 20.0);
        assert_approx_eq!(bp.goal_state().speed_ms, 5.0);
        assert_goal_speed_invariant(&bp, &route);
    }

    #[test]
    fn test_traffic_light_stop() {
        let route = route(21, None);
        let mut bp = planner(16.0);
        let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);

        // Red light beyond the stop depth is ignored
        bp.transition_state(&route, &ego, 40.0, TrafficLightLabel::Stop);
        assert_eq!(bp.state(), BehaviourState::FollowLane);

        bp.transition_state(&route, &ego, 12.0, TrafficLightLabel::Stop);
        assert_eq!(bp.state(), BehaviourState::TrafficLightStop);
        assert_approx_eq!(bp.goal_state().position_m.x, 12.0 - 3.5);
        assert_goal_speed_invariant(&bp, &route);

        // Never times out, even once stopped and the light disappears
        let stopped = EgoState::new(8.0, 0.0, 0.0, 0.0);
        for _ in 0..50 {
            bp.transition_state(&route, &stopped, NO_LIGHT_M, TrafficLightLabel::None);
            assert_eq!(bp.state(), BehaviourState::TrafficLightStop);
        }

        bp.transition_state(&route, &stopped, 4.0, TrafficLightLabel::Go);
        assert_eq!(bp.state(), BehaviourState::FollowLane);
        assert_goal_speed_invariant(&bp, &route);
    }

    #[test]
    fn test_stop_line_cycle() {
        let route = route(21, Some(6));
        let mut bp = planner(35.0);

        // No light at the stop line, stop as for a stop sign
        bp.transition_state(
            &route,
            &EgoState::new(0.0, 0.0, 0.0, 5.0),
            NO_LIGHT_M,
            TrafficLightLabel::None,
        );
        assert_eq!(bp.state(), BehaviourState::DecelerateToStop);
        assert_eq!(bp.stop_reason(), Some(StopReason::StopLine(6)));
        assert_approx_eq!(bp.goal_state().position_m.x, 30.0 - 3.5);
        assert_goal_speed_invariant(&bp, &route);

        // Still moving, keep decelerating
        bp.transition_state(
            &route,
            &EgoState::new(20.0, 0.0, 0.0, 2.0),
            NO_LIGHT_M,
            TrafficLightLabel::None,
        );
        assert_eq!(bp.state(), BehaviourState::DecelerateToStop);

        let stopped = EgoState::new(26.0, 0.0, 0.0, 0.0);
        bp.transition_state(&route, &stopped, NO_LIGHT_M, TrafficLightLabel::None);
        assert_eq!(bp.state(), BehaviourState::StayStopped);

        // Red light holds the vehicle past the hold time
        for _ in 0..20 {
            bp.transition_state(&route, &stopped, 5.0, TrafficLightLabel::Stop);
            assert_eq!(bp.state(), BehaviourState::StayStopped);
            assert_goal_speed_invariant(&bp, &route);
        }

        bp.transition_state(&route, &stopped, 5.0, TrafficLightLabel::Go);
        assert_eq!(bp.state(), BehaviourState::FollowLane);
        assert!(bp.goal_index() > 6);
        assert_goal_speed_invariant(&bp, &route);

        // The served stop line does not trigger again
        bp.transition_state(&route, &stopped, NO_LIGHT_M, TrafficLightLabel::None);
        assert_eq!(bp.state(), BehaviourState::FollowLane);
    }

    #[test]
    fn test_green_at_stop_line() {
        let route = route(21, Some(6));
        let mut bp = planner(35.0);
        let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);

        bp.transition_state(&route, &ego, 10.0, TrafficLightLabel::Go);
        assert_eq!(bp.state(), BehaviourState::FollowLane);

        bp.transition_state(&route, &ego, 10.0, TrafficLightLabel::Stop);
        assert_eq!(bp.state(), BehaviourState::DecelerateToStop);

        bp.transition_state(&route, &ego, 10.0, TrafficLightLabel::Go);
        assert_eq!(bp.state(), BehaviourState::FollowLane);
    }

    #[test]
    fn test_route_end() {
        let route = route(5, None);
        let mut bp = planner(30.0);

        bp.transition_state(
            &route,
            &EgoState::new(0.0, 0.0, 0.0, 5.0),
            NO_LIGHT_M,
            TrafficLightLabel::None,
        );
        assert_eq!(bp.state(), BehaviourState::DecelerateToStop);
        assert_eq!(bp.stop_reason(), Some(StopReason::RouteEnd));
        assert_eq!(bp.goal_index(), route.last_index());
        assert_goal_speed_invariant(&bp, &route);

        let stopped = EgoState::new(19.5, 0.0, 0.0, 0.0);
        bp.transition_state(&route, &stopped, NO_LIGHT_M, TrafficLightLabel::None);
        assert_eq!(bp.state(), BehaviourState::StayStopped);

        for _ in 0..50 {
            bp.transition_state(&route, &stopped, 5.0, TrafficLightLabel::Go);
            assert_eq!(bp.state(), BehaviourState::StayStopped);
        }
    }

    #[test]
    fn test_lead_vehicle_hysteresis() {
        // The planning lookahead plays no part
        let mut bp = planner(40.0);
        let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);

        assert!(!bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(20.0, 0.0))));
        assert!(!bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(13.0, 0.0))));
        assert!(bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(12.5, 0.0))));

        // Outside the activation radius but inside the lead lookahead
        assert!(bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(20.0, 0.0))));
        assert!(bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(25.0, 0.0))));
        assert!(!bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(25.5, 0.0))));
        assert!(!bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(20.0, 0.0))));

        // Not ahead
        assert!(!bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(5.0, 5.0))));
        assert!(!bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(-5.0, 0.0))));

        bp.check_for_lead_vehicle(&ego, Some(&Vector2::new(10.0, 0.0)));
        assert!(!bp.check_for_lead_vehicle(&ego, None));
        assert!(!bp.flags().follow_lead_vehicle);
    }

    #[test]
    fn test_reset_emergency_flags() {
        let mut bp = planner(20.0);
        bp.flags_mut().handbrake = true;
        bp.flags_mut().obstacle = true;
        bp.flags_mut().follow_lead_vehicle = true;

        bp.reset_emergency_flags();
        assert_eq!(
            bp.flags(),
            IntentFlags {
                handbrake: false,
                obstacle: false,
                follow_lead_vehicle: true,
            }
        );
    }
}
