//! Closed loop scenarios for the planning and control stack.

use assert_approx_eq::assert_approx_eq;
use nalgebra::Vector2;

use drive_lib::auto::{
    behav_plan::{BehavPlanParams, BehaviourState, BehaviouralPlanner},
    geom::Transform2,
    loc::EgoState,
    local_plan::{LeadVehicle, LocalPlanParams, LocalPlanner},
    per::{NoTrafficLight, ReportedTrafficLight},
    route::{Route, Waypoint, WaypointMarker},
    traj_ctrl::TrajCtrlParams,
    DriveMgr, DriveMgrParams,
};
use sim_if::{
    meas::{AgentKind, AgentMeasurement, Extent, Measurement, PlayerMeasurement},
    tl::{TrafficLightLabel, TrafficLightReport},
};

// ---------------------------------------------------------------------------
// HELPERS
// ---------------------------------------------------------------------------

const EXTENT: Extent = Extent { x_m: 2.0, y_m: 1.0 };

/// Straight route along +X with a waypoint every meter.
fn straight_route(len: usize, speed_ms: f64, stop_line: Option<usize>) -> Route {
    let mut wps: Vec<Waypoint> = (0..len)
        .map(|i| Waypoint::new(i as f64, 0.0, speed_ms))
        .collect();
    if let Some(s) = stop_line {
        wps[s].marker = WaypointMarker::StopLine;
    }
    Route::new(wps).unwrap()
}

fn player(x_m: f64, y_m: f64, yaw_rad: f64, speed_ms: f64) -> PlayerMeasurement {
    PlayerMeasurement {
        x_m,
        y_m,
        yaw_rad,
        forward_speed_ms: speed_ms,
        extent: EXTENT,
    }
}

fn measurement(player: PlayerMeasurement, timestamp_s: f64, frame: u64) -> Measurement {
    Measurement {
        timestamp_s,
        frame,
        player,
        agents: vec![],
        traffic_light: None,
    }
}

// ---------------------------------------------------------------------------
// SCENARIOS
// ---------------------------------------------------------------------------

/// Nominal driving on an empty road picks the centre path and holds the
/// desired speed.
#[test]
fn test_nominal_driving() {
    let route = straight_route(60, 5.0, None);
    let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);

    let mut bp = BehaviouralPlanner::new(BehavPlanParams::default());
    bp.set_lookahead(20.0);
    let state = bp.transition_state(&route, &ego, 1000.0, TrafficLightLabel::None);
    assert_eq!(state, BehaviourState::FollowLane);
    assert_eq!(bp.goal_index(), 20);
    assert_approx_eq!(bp.goal_state().speed_ms, 5.0);

    let mut lp = LocalPlanner::new(&LocalPlanParams::default()).unwrap();
    let goal_set = lp
        .path_generator
        .get_goal_state_set(bp.goal_index(), bp.goal_state(), &route, &ego);

    // Symmetric around the goal
    assert_eq!(goal_set.len(), 7);
    for i in 0..3 {
        assert_approx_eq!(goal_set[i].position_m.y, -goal_set[6 - i].position_m.y);
    }
    assert_approx_eq!(goal_set[3].position_m.y, 0.0);

    let paths = lp
        .path_generator
        .transform_paths(&lp.path_generator.plan_paths(&goal_set), &ego);
    let free = lp.collision_checker.collision_check(&paths, &[]);
    let (best_index, best_path) = lp.select_path(&paths, &free, bp.goal_state());
    assert_eq!(best_index, Some(3));

    let profile = lp
        .velocity_planner
        .compute_velocity_profile(best_path.as_ref(), 5.0, &ego, 5.0, false, None, false, false)
        .unwrap();

    for pair in profile.windows(2) {
        assert!(pair[1].speed_ms >= pair[0].speed_ms - 1e-9);
    }
    assert_approx_eq!(profile.last().unwrap().speed_ms, 5.0);
}

/// A slower vehicle ahead is followed with a capped, smoothly approached
/// speed.
#[test]
fn test_follow_lead_vehicle() {
    let route = straight_route(60, 8.0, None);
    let ego = EgoState::new(0.0, 0.0, 0.0, 8.0);
    let lead = LeadVehicle {
        position_m: Vector2::new(15.0, 0.0),
        speed_ms: 2.0,
    };

    let mut bp = BehaviouralPlanner::new(BehavPlanParams::default());
    bp.set_lookahead(16.0 + 1.0 * ego.speed_ms);
    bp.transition_state(&route, &ego, 1000.0, TrafficLightLabel::None);

    // Inside the planning lookahead but not yet within the activation radius
    assert!(!bp.check_for_lead_vehicle(&ego, Some(&lead.position_m)));

    let closer = EgoState::new(3.0, 0.0, 0.0, 8.0);
    assert!(bp.check_for_lead_vehicle(&closer, Some(&lead.position_m)));
    assert!(bp.flags().follow_lead_vehicle);

    // Held while the lead pulls away within the lead lookahead
    assert!(bp.check_for_lead_vehicle(&ego, Some(&lead.position_m)));

    let mut lp = LocalPlanner::new(&LocalPlanParams::default()).unwrap();
    let goal_set = lp
        .path_generator
        .get_goal_state_set(bp.goal_index(), bp.goal_state(), &route, &ego);
    let paths = lp
        .path_generator
        .transform_paths(&lp.path_generator.plan_paths(&goal_set), &ego);
    let free = lp.collision_checker.collision_check(&paths, &[]);
    let (_, best_path) = lp.select_path(&paths, &free, bp.goal_state());
    let best_path = best_path.unwrap();

    let profile = lp
        .velocity_planner
        .compute_velocity_profile(
            Some(&best_path),
            bp.goal_state().speed_ms,
            &ego,
            8.0,
            false,
            Some(&lead),
            true,
            false,
        )
        .unwrap();

    let a_max = LocalPlanParams::default().velocity.a_max_mss;
    for pair in profile.windows(2) {
        let d = (pair[1].position_m - pair[0].position_m).norm();
        assert!(pair[1].speed_ms <= 8.0 + 1e-9);
        assert!(pair[0].speed_ms.powi(2) - pair[1].speed_ms.powi(2) <= 2.0 * a_max * d + 1e-6);
    }

    // At and beyond the lead the speed is capped
    for p in profile.iter().filter(|p| p.position_m.x >= 15.0) {
        assert!(p.speed_ms <= 2.0 + 1e-9);
    }
}

/// A pedestrian crossing just in front of the bumper triggers the handbrake.
#[test]
fn test_pedestrian_emergency_brake() {
    let mut dm = DriveMgr::new(
        DriveMgrParams::default(),
        TrajCtrlParams::default(),
        straight_route(100, 5.0, None),
        NoTrafficLight,
    )
    .unwrap();

    let mut meas = measurement(player(0.0, 0.0, 0.0, 0.0), 0.0, 0);
    meas.agents.push(AgentMeasurement {
        kind: AgentKind::Pedestrian,
        x_m: 3.0,
        y_m: 0.5,
        yaw_rad: std::f64::consts::FRAC_PI_2,
        forward_speed_ms: 1.0,
        extent: Extent { x_m: 0.3, y_m: 0.3 },
    });

    let out = dm.step(&meas, &()).unwrap();
    assert!(out.flags.handbrake);
    assert!(out.flags.obstacle);
    assert_approx_eq!(out.control.throttle, 0.0);
    assert_approx_eq!(out.control.brake, 1.0);

    // The handbrake holds on the following control tick
    let out = dm.step(&measurement(player(0.0, 0.0, 0.0, 0.0), 0.05, 1), &()).unwrap();
    assert!(!out.planned);
    assert_approx_eq!(out.control.brake, 1.0);
}

/// A red light with a stop line in the horizon stops the vehicle before the
/// line.
#[test]
fn test_red_light_at_stop_line() {
    let route = straight_route(60, 5.0, Some(12));
    let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);
    let buffer_m = BehavPlanParams::default().stop_line_buffer_m;

    let mut bp = BehaviouralPlanner::new(BehavPlanParams::default());
    bp.set_lookahead(16.0);
    let state = bp.transition_state(&route, &ego, 10.0, TrafficLightLabel::Stop);

    assert_eq!(state, BehaviourState::DecelerateToStop);
    assert_approx_eq!(bp.goal_state().position_m.x, 12.0 - buffer_m);
    assert_approx_eq!(bp.goal_state().speed_ms, 0.0);
}

/// A vehicle at rest short of a stop sign creeps up to it and then holds.
#[test]
fn test_creep_to_stop_sign() {
    // Replaced by the behaviour planner's arrival tolerance
    let mut params = DriveMgrParams::default();
    params.local_plan.velocity.stop_position_tolerance_m = 10.0;
    let mut dm = DriveMgr::new(
        params,
        TrajCtrlParams::default(),
        straight_route(100, 5.0, Some(30)),
        NoTrafficLight,
    )
    .unwrap();

    // 3.2 m short of the goal, which is just outside the arrival tolerance
    let out = dm
        .step(&measurement(player(23.3, 0.0, 0.0, 0.0), 0.0, 0), &())
        .unwrap();
    assert_eq!(out.state, BehaviourState::DecelerateToStop);
    assert_approx_eq!(dm.behav_planner().goal_state().position_m.x, 26.5);

    let max_ref_ms = dm
        .traj_ctrl()
        .waypoints()
        .iter()
        .map(|w| w.speed_ms)
        .fold(0.0, f64::max);
    assert!(max_ref_ms > 0.0);
    assert!(out.control.throttle > 0.0);

    // Once inside the tolerance the stop is reached
    let _ = dm
        .step(&measurement(player(23.3, 0.0, 0.0, 0.0), 0.05, 1), &())
        .unwrap();
    let out = dm
        .step(&measurement(player(23.8, 0.0, 0.0, 0.0), 0.1, 2), &())
        .unwrap();
    assert!(out.planned);
    assert_eq!(out.state, BehaviourState::StayStopped);
}

/// A red light without a stop line stops in front of the light, and only a
/// green light releases it.
#[test]
fn test_red_light_without_stop_line() {
    let mut dm = DriveMgr::new(
        DriveMgrParams::default(),
        TrajCtrlParams::default(),
        straight_route(100, 5.0, None),
        ReportedTrafficLight,
    )
    .unwrap();

    let red = Some(TrafficLightReport {
        label: TrafficLightLabel::Stop,
        depth_m: 10.0,
    });

    let meas = measurement(player(0.0, 0.0, 0.0, 5.0), 0.0, 0);
    let out = dm.step(&meas, &red).unwrap();
    assert_eq!(out.state, BehaviourState::TrafficLightStop);
    assert_approx_eq!(dm.behav_planner().goal_state().position_m.x, 10.0 - 3.5);

    // The reference ends stationary
    let last = dm.traj_ctrl().waypoints().last().unwrap();
    assert_approx_eq!(last.speed_ms, 0.0);

    // No light does not release a light stop
    let out = dm
        .step(&measurement(player(6.0, 0.0, 0.0, 0.0), 1.0, 1), &None)
        .unwrap();
    assert_eq!(out.state, BehaviourState::TrafficLightStop);
    let out = dm
        .step(&measurement(player(6.0, 0.0, 0.0, 0.0), 1.1, 2), &None)
        .unwrap();
    assert_eq!(out.state, BehaviourState::TrafficLightStop);

    let green = Some(TrafficLightReport {
        label: TrafficLightLabel::Go,
        depth_m: 4.0,
    });
    let _ = dm
        .step(&measurement(player(6.0, 0.0, 0.0, 0.0), 1.2, 3), &green)
        .unwrap();
    let out = dm
        .step(&measurement(player(6.0, 0.0, 0.0, 0.0), 1.3, 4), &green)
        .unwrap();
    assert_eq!(out.state, BehaviourState::FollowLane);
}

/// With every path blocked the previous best path is used.
#[test]
fn test_fallback_to_previous_path() {
    let route = straight_route(60, 5.0, None);
    let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);

    let mut bp = BehaviouralPlanner::new(BehavPlanParams::default());
    bp.set_lookahead(20.0);
    bp.transition_state(&route, &ego, 1000.0, TrafficLightLabel::None);

    let mut lp = LocalPlanner::new(&LocalPlanParams::default()).unwrap();
    let goal_set = lp
        .path_generator
        .get_goal_state_set(bp.goal_index(), bp.goal_state(), &route, &ego);
    let paths = lp
        .path_generator
        .transform_paths(&lp.path_generator.plan_paths(&goal_set), &ego);

    let free = lp.collision_checker.collision_check(&paths, &[]);
    let (first_index, first_path) = lp.select_path(&paths, &free, bp.goal_state());
    assert!(first_index.is_some());

    // A wall across the road blocks everything
    let wall: Vec<Vector2<f64>> = (-40..=40)
        .map(|i| Vector2::new(10.0, i as f64 * 0.25))
        .collect();
    let blocked = lp.collision_checker.collision_check(&paths, &wall);
    assert!(blocked.iter().all(|&f| !f));

    let (index, path) = lp.select_path(&paths, &blocked, bp.goal_state());
    assert_eq!(index, None);
    assert_eq!(path, first_path);
}

/// Candidate paths survive the trip into the world frame and back.
#[test]
fn test_transform_round_trip() {
    let route = Route::new(
        (0..60)
            .map(|i| {
                let s = i as f64;
                Waypoint::new(10.0 + s * 0.6, -5.0 + s * 0.8, 5.0)
            })
            .collect(),
    )
    .unwrap();
    let ego = EgoState::new(10.0, -5.0, route.heading_at(0), 3.0);

    let mut bp = BehaviouralPlanner::new(BehavPlanParams::default());
    bp.set_lookahead(18.0);
    bp.transition_state(&route, &ego, 1000.0, TrafficLightLabel::None);

    let lp = LocalPlanner::new(&LocalPlanParams::default()).unwrap();
    let goal_set = lp
        .path_generator
        .get_goal_state_set(bp.goal_index(), bp.goal_state(), &route, &ego);
    let local = lp.path_generator.plan_paths(&goal_set);
    let world = lp.path_generator.transform_paths(&local, &ego);

    assert_eq!(local.valid, world.valid);
    assert!(local.num_valid() > 0);

    let to_local = Transform2::from_pose(&ego.pose).inverse();
    for (l, w) in local.paths.iter().zip(world.paths.iter()) {
        let back = w.transformed(&to_local);
        assert_eq!(back.get_num_points(), l.get_num_points());

        for (a, b) in back.points_m.iter().zip(l.points_m.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
        for (a, b) in back.headings_rad.iter().zip(l.headings_rad.iter()) {
            assert!(util::maths::abs_ang_dist(*a, *b) < 1e-9);
        }
    }
}

/// Drive a simple kinematic vehicle along the route from rest.
#[test]
fn test_closed_loop_drive() {
    const DT_S: f64 = 0.05;
    const WHEELBASE_M: f64 = 2.5;

    let ctrl_params = TrajCtrlParams::default();
    let max_steer_rad = ctrl_params.max_steer_rad;

    let mut dm = DriveMgr::new(
        DriveMgrParams::default(),
        ctrl_params,
        straight_route(100, 5.0, None),
        NoTrafficLight,
    )
    .unwrap();

    let (mut x, mut y, mut yaw, mut v) = (0.0f64, -0.5f64, 0.0f64, 0.0f64);

    for frame in 0..200u64 {
        let meas = measurement(player(x, y, yaw, v), frame as f64 * DT_S, frame);
        let out = dm.step(&meas, &()).unwrap();

        assert!(!out.flags.handbrake);
        assert!(!out.mission_complete);

        let c = out.control;
        assert!((0.0..=1.0).contains(&c.throttle));
        assert!((0.0..=1.0).contains(&c.brake));
        assert!((-1.0..=1.0).contains(&c.steer));

        let accel_mss = 3.0 * c.throttle - 6.0 * c.brake;
        v = (v + accel_mss * DT_S).max(0.0);
        yaw += v / WHEELBASE_M * (c.steer * max_steer_rad).tan() * DT_S;
        x += v * yaw.cos() * DT_S;
        y += v * yaw.sin() * DT_S;
    }

    assert!(x > 5.0);
    assert!(y.abs() < 0.5);
    assert!(v > 0.0);
}

/// The shipped parameter files parse.
#[test]
fn test_param_files() {
    let dm: DriveMgrParams =
        util::params::parse(include_str!("../../params/drive_mgr.toml")).unwrap();
    assert_eq!(dm.local_plan.path_gen.num_paths, 7);
    assert_eq!(dm.lp_frequency_divisor, 2);
    assert_approx_eq!(dm.behav.lead_activation_m, 13.0);
    assert_approx_eq!(dm.behav.lead_lookahead_m, 25.0);

    let tc: TrajCtrlParams =
        util::params::parse(include_str!("../../params/traj_ctrl.toml")).unwrap();
    assert_approx_eq!(tc.max_steer_rad, 1.22);
    assert_approx_eq!(tc.long_i_limit, 10.0);
}
