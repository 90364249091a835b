//! # Velocity planner
//!
//! Annotates the chosen path with a speed at every sample, and dead-reckons
//! the vehicle's speed between planning ticks from the last profile.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use serde::Serialize;

use super::VelocityParams;
use crate::auto::{
    loc::EgoState,
    path::{Path, ProfilePoint},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The vehicle being followed.
#[derive(Debug, Copy, Clone, Serialize, PartialEq)]
pub struct LeadVehicle {
    pub position_m: Vector2<f64>,
    pub speed_ms: f64,
}

#[derive(Debug, Clone)]
pub struct VelocityPlanner {
    params: VelocityParams,

    /// The last profile produced, used for the open loop speed estimate
    prev_trajectory: Vec<ProfilePoint>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VelocityPlanner {
    pub fn new(params: VelocityParams) -> Self {
        Self {
            params,
            prev_trajectory: Vec::new(),
        }
    }

    pub fn prev_trajectory(&self) -> &[ProfilePoint] {
        &self.prev_trajectory
    }

    /// Estimate the current speed by walking along the previous profile for
    /// `elapsed_s` seconds.
    ///
    /// Each segment is traversed at the mean of its end speeds. Returns
    /// `None` if no profile has been produced yet.
    pub fn get_open_loop_speed(&self, elapsed_s: f64) -> Option<f64> {
        let first = self.prev_trajectory.first()?;

        if self.prev_trajectory.len() == 1 || elapsed_s < 1e-4 {
            return Some(first.speed_ms);
        }

        let mut remaining_s = elapsed_s;

        for pair in self.prev_trajectory.windows(2) {
            let (v1, v2) = (pair[0].speed_ms, pair[1].speed_ms);
            let dist_m = (pair[1].position_m - pair[0].position_m).norm();
            let mean_speed = (v1 + v2) / 2.0;

            // The profile stalls on a stationary segment
            if mean_speed <= 1e-6 {
                return Some(v1);
            }

            let seg_s = dist_m / mean_speed;
            if seg_s > remaining_s {
                return Some(v1 + (v2 - v1) * remaining_s / seg_s);
            }

            remaining_s -= seg_s;
        }

        self.prev_trajectory.last().map(|p| p.speed_ms)
    }

    /// Compute the speed profile along `path`.
    ///
    /// The modes, in priority order, are:
    ///  1. `emergency_brake` - zero speed everywhere.
    ///  2. `decelerate_to_stop` - constant deceleration to zero at the end
    ///     of the path.
    ///  3. `follow_lead_vehicle` with a lead - nominal profile, capped to the
    ///     lead's speed from one time gap behind it, reached with bounded
    ///     deceleration, or the constant deceleration that just reaches it
    ///     if the lead is too close.
    ///  4. Nominal - bounded acceleration from the ego speed to
    ///     `desired_speed_ms`, then hold.
    ///
    /// Returns `None` if there is no path, in which case the previous
    /// profile is kept.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_velocity_profile(
        &mut self,
        path: Option<&Path>,
        desired_speed_ms: f64,
        ego: &EgoState,
        current_speed_ms: f64,
        decelerate_to_stop: bool,
        lead_vehicle: Option<&LeadVehicle>,
        follow_lead_vehicle: bool,
        emergency_brake: bool,
    ) -> Option<Vec<ProfilePoint>> {
        let path = path.filter(|p| !p.is_empty())?;
        let start_speed_ms = ego.speed_ms.max(0.0);

        let speeds = if emergency_brake {
            vec![0.0; path.get_num_points()]
        } else if decelerate_to_stop {
            self.decelerate_profile(path, start_speed_ms, current_speed_ms)
        } else {
            match lead_vehicle {
                Some(lead) if follow_lead_vehicle => {
                    self.follow_profile(path, start_speed_ms, desired_speed_ms, lead)
                }
                _ => self.nominal_profile(path, start_speed_ms, desired_speed_ms),
            }
        };

        let profile: Vec<ProfilePoint> = path
            .points_m
            .iter()
            .zip(speeds.into_iter())
            .map(|(p, v)| ProfilePoint {
                position_m: *p,
                speed_ms: v.max(0.0),
            })
            .collect();

        trace!(
            "Velocity profile: {} points, {:.2} -> {:.2} m/s",
            profile.len(),
            profile.first().map(|p| p.speed_ms).unwrap_or(0.0),
            profile.last().map(|p| p.speed_ms).unwrap_or(0.0)
        );

        self.prev_trajectory = profile.clone();

        Some(profile)
    }

    fn nominal_profile(&self, path: &Path, start_ms: f64, desired_ms: f64) -> Vec<f64> {
        let dists = segment_lengths(path);
        let mut speeds = Vec::with_capacity(path.get_num_points());
        let mut v = start_ms;
        speeds.push(v);

        for d in dists {
            v = ramp(v, desired_ms, self.params.a_max_mss, d);
            speeds.push(v);
        }

        speeds
    }

    fn decelerate_profile(&self, path: &Path, start_ms: f64, current_ms: f64) -> Vec<f64> {
        let dists = segment_lengths(path);
        let length_m: f64 = dists.iter().sum();

        if length_m <= std::f64::EPSILON {
            return vec![0.0; path.get_num_points()];
        }

        // Creep up to the stop point until within the arrival tolerance
        let v0 = if current_ms < self.params.slow_speed_ms
            && length_m > self.params.stop_position_tolerance_m
        {
            start_ms.max(self.params.slow_speed_ms)
        } else {
            start_ms
        };

        let mut speeds = Vec::with_capacity(path.get_num_points());
        let mut s_m = 0.0;
        speeds.push(v0);

        for d in dists {
            s_m += d;
            speeds.push((v0 * v0 * (1.0 - s_m / length_m)).max(0.0).sqrt());
        }

        if let Some(last) = speeds.last_mut() {
            *last = 0.0;
        }

        speeds
    }

    fn follow_profile(
        &self,
        path: &Path,
        start_ms: f64,
        desired_ms: f64,
        lead: &LeadVehicle,
    ) -> Vec<f64> {
        let mut speeds = self.nominal_profile(path, start_ms, desired_ms);
        let dists = segment_lengths(path);
        let target_ms = desired_ms.min(lead.speed_ms).max(0.0);

        // The sample closest to the lead, then one time gap back from it
        let lead_index = path
            .points_m
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| OrderedFloat((*p - lead.position_m).norm()))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let gap_m = lead.speed_ms.max(0.0) * self.params.time_gap_s;
        let mut ramp_end = lead_index;
        let mut back_m = 0.0;
        while ramp_end > 0 && back_m < gap_m {
            back_m += dists[ramp_end - 1];
            ramp_end -= 1;
        }

        // The first sample is the ego speed, so the cap starts one sample on
        let ramp_end = ramp_end.max(1).min(speeds.len() - 1);

        for v in speeds[ramp_end..].iter_mut() {
            *v = v.min(target_ms);
        }

        let ramp_m: f64 = dists[..ramp_end].iter().sum();
        let a_max = self.params.a_max_mss;

        if start_ms.powi(2) - 2.0 * a_max * ramp_m > target_ms.powi(2) {
            // Too close to reach the cap at a_max, use the required constant
            // deceleration instead
            let dv2 = start_ms.powi(2) - target_ms.powi(2);
            let mut s_m = 0.0;
            for i in 1..ramp_end {
                s_m += dists[i - 1];
                let v = (start_ms.powi(2) - dv2 * s_m / ramp_m).max(target_ms.powi(2)).sqrt();
                speeds[i] = speeds[i].min(v);
            }
        } else {
            // Bounded deceleration into the capped section
            for i in (1..ramp_end).rev() {
                let reachable = (speeds[i + 1].powi(2) + 2.0 * a_max * dists[i]).sqrt();
                speeds[i] = speeds[i].min(reachable);
            }
        }

        speeds[0] = start_ms;

        speeds
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Speed after moving `dist_m` from `from_ms` towards `to_ms` with at most
/// `accel_mss` acceleration, without overshooting `to_ms`.
fn ramp(from_ms: f64, to_ms: f64, accel_mss: f64, dist_m: f64) -> f64 {
    if from_ms < to_ms {
        (from_ms * from_ms + 2.0 * accel_mss * dist_m).sqrt().min(to_ms)
    } else {
        (from_ms * from_ms - 2.0 * accel_mss * dist_m)
            .max(0.0)
            .sqrt()
            .max(to_ms)
    }
}

fn segment_lengths(path: &Path) -> Vec<f64> {
    path.points_m
        .windows(2)
        .map(|w| (w[1] - w[0]).norm())
        .collect()
}
