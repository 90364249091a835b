//! # Safety rules
//!
//! Rules run each planning tick which raise the emergency flags of the
//! behaviour planner: pedestrians in front of the bumper, pedestrians
//! predicted to cross the candidate paths, blocked intersections and a lead
//! vehicle which is too close.
//!
//! Rules only ever raise flags, clearing them is done once at the start of
//! the tick.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use nalgebra::Vector2;
use serde::Deserialize;
use sim_if::meas::Extent;
use util::maths::abs_ang_dist;

use super::{
    behav_plan::IntentFlags,
    geom::Transform2,
    loc::{EgoState, Pose},
    local_plan::LeadVehicle,
    per::PedestrianInfo,
    route::Region,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetyParams {
    /// Half size of the emergency box in front of the bumper
    pub box_half_size_m: f64,

    /// Half length of the emergency box along the heading when driving
    /// straight with no pedestrian danger
    pub box_extended_half_length_m: f64,

    /// Shift of the box along the heading while moving
    pub box_motion_offset_m: f64,

    /// Speed above which the vehicle is considered moving
    pub moving_speed_ms: f64,

    /// Pedestrians whose heading differs from the ego's by an angle in this
    /// band are crossing
    pub crossing_min_angle_rad: f64,
    pub crossing_max_angle_rad: f64,

    /// Distance from the box centre within which a parallel pedestrian
    /// triggers the emergency brake
    pub parallel_trigger_radius_m: f64,

    /// Half width of the band around 90 degrees within which a pedestrian is
    /// heading across the road
    pub crossing_delta_rad: f64,

    /// Fraction of valid paths which must be blocked inside an intersection
    /// to brake
    pub intersection_blocked_ratio: f64,

    /// A lead vehicle closer than this triggers the emergency brake
    pub lead_emergency_distance_m: f64,
}

/// The outcome of pedestrian collision prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PedestrianPrediction {
    /// A collision is predicted on an active path
    pub collision: bool,

    /// The paths considered
    pub active: Vec<bool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            box_half_size_m: 3.0,
            box_extended_half_length_m: 7.0,
            box_motion_offset_m: 1.0,
            moving_speed_ms: 0.1,
            crossing_min_angle_rad: 10f64.to_radians(),
            crossing_max_angle_rad: 170f64.to_radians(),
            parallel_trigger_radius_m: 1.5,
            crossing_delta_rad: 45f64.to_radians(),
            intersection_blocked_ratio: 0.7,
            lead_emergency_distance_m: 10.0,
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Position of the middle of the front bumper.
pub fn front_bumper(pose: &Pose, extent: &Extent) -> Vector2<f64> {
    pose.position_m + pose.forward2() * extent.x_m
}

/// True if the front bumper is inside any of the intersection regions.
pub fn in_intersection(pose: &Pose, extent: &Extent, regions: &[Region]) -> bool {
    let bumper_m = front_bumper(pose, extent);
    regions.iter().any(|r| r.contains(&bumper_m))
}

/// Brake for pedestrians in the emergency box ahead of the bumper.
///
/// The box is aligned with the ego heading. Crossing pedestrians trigger
/// anywhere inside the box, pedestrians walking parallel to the ego only
/// when close to its centre. Sets `handbrake` and `obstacle` and returns
/// `true` if triggered.
pub fn emergency_brake_pedestrian(
    ego: &EgoState,
    extent: &Extent,
    pedestrians: &[PedestrianInfo],
    driving_straight: bool,
    flags: &mut IntentFlags,
    params: &SafetyParams,
) -> bool {
    let offset_m = if ego.speed_ms > params.moving_speed_ms {
        params.box_motion_offset_m
    } else {
        0.0
    };
    let centre_m = front_bumper(&ego.pose, extent) + ego.pose.forward2() * offset_m;

    let half_length_m = if driving_straight && !flags.obstacle {
        params.box_extended_half_length_m
    } else {
        params.box_half_size_m
    };

    let to_box = Transform2::new(ego.heading(), centre_m).inverse();

    let triggered = pedestrians.iter().any(|p| {
        let rel_rad = abs_ang_dist(ego.heading(), p.heading_rad);

        if rel_rad >= params.crossing_min_angle_rad && rel_rad <= params.crossing_max_angle_rad {
            let local = to_box.apply_point(&p.position_m);
            local.x.abs() < half_length_m && local.y.abs() < params.box_half_size_m
        } else {
            (p.position_m - centre_m).norm() <= params.parallel_trigger_radius_m
        }
    });

    if triggered {
        warn!("Pedestrian in the emergency box, braking");
        flags.handbrake = true;
        flags.obstacle = true;
    }

    triggered
}

/// Predict collisions with pedestrians on the candidate paths.
///
/// The three central paths are always active. The other paths, except the
/// two outermost, become active when any pedestrian is heading across the
/// road. A collision is predicted if a valid active path is blocked by a
/// pedestrian. Sets `obstacle` on a predicted collision.
pub fn predict_pedestrian_collisions(
    pedestrian_free: &[bool],
    valid: &[bool],
    pedestrians: &[PedestrianInfo],
    ego: &EgoState,
    flags: &mut IntentFlags,
    params: &SafetyParams,
) -> PedestrianPrediction {
    let n = pedestrian_free.len();
    let mid = n / 2;

    let mut active = if n >= 3 {
        let mut a = vec![false; n];
        a[mid - 1] = true;
        a[mid] = true;
        a[mid + 1] = true;
        a
    } else {
        vec![true; n]
    };

    let blocked: Vec<bool> = pedestrian_free
        .iter()
        .zip(valid.iter())
        .map(|(&free, &v)| v && !free)
        .collect();

    if n >= 3 && blocked.iter().any(|&b| b) {
        let crossing = pedestrians.iter().any(|p| {
            let rel_rad = abs_ang_dist(ego.heading(), p.heading_rad);
            (rel_rad - std::f64::consts::FRAC_PI_2).abs() <= params.crossing_delta_rad
        });

        if crossing {
            for a in active.iter_mut().take(n - 1).skip(1) {
                *a = true;
            }
        }
    }

    let collision = blocked.iter().zip(active.iter()).any(|(&b, &a)| b && a);

    if collision {
        flags.obstacle = true;
    }

    PedestrianPrediction { collision, active }
}

/// Brake inside an intersection if most of the valid paths are blocked by
/// vehicles. Sets `handbrake` and returns `true` if triggered.
pub fn check_intersection_collisions(
    vehicle_free: &[bool],
    valid: &[bool],
    in_intersection: bool,
    flags: &mut IntentFlags,
    params: &SafetyParams,
) -> bool {
    if !in_intersection {
        return false;
    }

    let num_valid = valid.iter().filter(|&&v| v).count();
    let num_blocked = vehicle_free
        .iter()
        .zip(valid.iter())
        .filter(|&(&free, &v)| v && !free)
        .count();

    let triggered =
        num_valid > 0 && num_blocked as f64 >= num_valid as f64 * params.intersection_blocked_ratio;

    if triggered {
        warn!(
            "{} of {} paths blocked inside the intersection, braking",
            num_blocked, num_valid
        );
        flags.handbrake = true;
    }

    triggered
}

/// Brake if the followed lead vehicle is too close. Sets `handbrake` and
/// returns `true` if triggered.
pub fn check_lead_vehicle_distance(
    ego: &EgoState,
    lead: &LeadVehicle,
    flags: &mut IntentFlags,
    params: &SafetyParams,
) -> bool {
    let triggered = (lead.position_m - ego.position2()).norm() < params.lead_emergency_distance_m;

    if triggered {
        warn!("Lead vehicle closer than {} m, braking", params.lead_emergency_distance_m);
        flags.handbrake = true;
    }

    triggered
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    const EXTENT: Extent = Extent { x_m: 2.0, y_m: 1.0 };

    fn ped(x: f64, y: f64, heading: f64) -> PedestrianInfo {
        PedestrianInfo {
            position_m: Vector2::new(x, y),
            heading_rad: heading,
        }
    }

    #[test]
    fn test_emergency_box() {
        let params = SafetyParams::default();
        let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);

        // Box centre is at 2 + 1 = 3 m ahead of the ego
        let mut flags = IntentFlags::default();
        assert!(emergency_brake_pedestrian(&ego, &EXTENT, &[ped(4.0, 1.0, PI / 2.0)], true, &mut flags, &params));
        assert!(flags.handbrake && flags.obstacle);

        // Beyond the short box but inside the extended one
        let mut flags = IntentFlags::default();
        assert!(emergency_brake_pedestrian(&ego, &EXTENT, &[ped(8.0, 0.0, PI / 2.0)], true, &mut flags, &params));
        let mut flags = IntentFlags::default();
        assert!(!emergency_brake_pedestrian(&ego, &EXTENT, &[ped(8.0, 0.0, PI / 2.0)], false, &mut flags, &params));
        assert!(!flags.handbrake);

        // Parallel pedestrians only trigger near the centre
        let mut flags = IntentFlags::default();
        assert!(!emergency_brake_pedestrian(&ego, &EXTENT, &[ped(3.0, 2.0, 0.0)], true, &mut flags, &params));
        assert!(emergency_brake_pedestrian(&ego, &EXTENT, &[ped(3.5, 0.5, PI)], true, &mut flags, &params));
    }

    #[test]
    fn test_emergency_box_rotated() {
        let params = SafetyParams::default();
        let ego = EgoState::new(10.0, 10.0, PI / 2.0, 5.0);

        let mut flags = IntentFlags::default();
        assert!(emergency_brake_pedestrian(&ego, &EXTENT, &[ped(10.5, 14.0, 0.0)], false, &mut flags, &params));

        let mut flags = IntentFlags::default();
        assert!(!emergency_brake_pedestrian(&ego, &EXTENT, &[ped(14.0, 10.5, 0.0)], false, &mut flags, &params));
    }

    #[test]
    fn test_predict_pedestrian_collisions() {
        let params = SafetyParams::default();
        let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);
        let valid = vec![true; 7];

        // Blocked outer path with a pedestrian walking along the road
        let free = vec![true, false, true, true, true, true, true];
        let mut flags = IntentFlags::default();
        let pred = predict_pedestrian_collisions(&free, &valid, &[ped(10.0, 3.0, 0.0)], &ego, &mut flags, &params);
        assert!(!pred.collision);
        assert!(!flags.obstacle);

        // Same path, pedestrian crossing
        let pred = predict_pedestrian_collisions(&free, &valid, &[ped(10.0, 3.0, PI / 2.0)], &ego, &mut flags, &params);
        assert!(pred.collision);
        assert_eq!(pred.active, vec![false, true, true, true, true, true, false]);
        assert!(flags.obstacle);

        // Central paths are always active
        let free = vec![true, true, true, false, true, true, true];
        let mut flags = IntentFlags::default();
        assert!(predict_pedestrian_collisions(&free, &valid, &[], &ego, &mut flags, &params).collision);

        // Invalid paths are not blocked
        let mut invalid = valid.clone();
        invalid[3] = false;
        let mut flags = IntentFlags::default();
        assert!(!predict_pedestrian_collisions(&free, &invalid, &[], &ego, &mut flags, &params).collision);
    }

    #[test]
    fn test_intersection_collisions() {
        let params = SafetyParams::default();
        let valid = vec![true; 7];
        let mut flags = IntentFlags::default();

        let mostly_blocked = vec![false, false, false, false, false, true, true];
        assert!(!check_intersection_collisions(&mostly_blocked, &valid, false, &mut flags, &params));
        assert!(check_intersection_collisions(&mostly_blocked, &valid, true, &mut flags, &params));
        assert!(flags.handbrake);

        let mut flags = IntentFlags::default();
        let half_blocked = vec![false, false, false, true, true, true, true];
        assert!(!check_intersection_collisions(&half_blocked, &valid, true, &mut flags, &params));
        assert!(!flags.handbrake);
    }

    #[test]
    fn test_in_intersection_and_lead() {
        let params = SafetyParams::default();
        let regions = vec![Region::around(&Vector2::new(20.0, 0.0), 7.0)];

        assert!(!in_intersection(&Pose::new(9.0, 0.0, 0.0), &EXTENT, &regions));
        assert!(in_intersection(&Pose::new(12.0, 0.0, 0.0), &EXTENT, &regions));

        let ego = EgoState::new(0.0, 0.0, 0.0, 5.0);
        let mut flags = IntentFlags::default();
        let lead = LeadVehicle {
            position_m: Vector2::new(12.0, 0.0),
            speed_ms: 2.0,
        };
        assert!(!check_lead_vehicle_distance(&ego, &lead, &mut flags, &params));
        let lead = LeadVehicle {
            position_m: Vector2::new(8.0, 0.0),
            speed_ms: 2.0,
        };
        assert!(check_lead_vehicle_distance(&ego, &lead, &mut flags, &params));
        assert!(flags.handbrake);
    }
}
