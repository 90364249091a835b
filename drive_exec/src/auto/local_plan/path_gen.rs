//! # Path generator
//!
//! Builds the set of laterally offset goal states around the behaviour
//! planner's goal, and solves a cubic spiral from the ego to each of them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::Vector2;
use util::maths::abs_ang_dist;

use super::{spiral::CubicSpiral, CandidatePaths, PathGenParams};
use crate::auto::{
    behav_plan::GoalState, geom::Transform2, loc::EgoState, path::Path, route::Route,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PathGenerator {
    params: PathGenParams,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathGenerator {
    pub fn new(params: PathGenParams) -> Self {
        Self { params }
    }

    pub fn num_paths(&self) -> usize {
        self.params.num_paths
    }

    /// Get the set of goal states in the ego-local frame.
    ///
    /// The goals are spread perpendicular to the route heading at
    /// `goal_index`, symmetric around `goal_state`, with the central goal
    /// being `goal_state` itself. Index 0 is the rightmost goal.
    pub fn get_goal_state_set(
        &self,
        goal_index: usize,
        goal_state: &GoalState,
        route: &Route,
        ego: &EgoState,
    ) -> Vec<GoalState> {
        let to_local = Transform2::from_pose(&ego.pose).inverse();

        let centre_m = to_local.apply_point(&goal_state.position_m);
        let heading_rad = to_local.apply_heading(route.heading_at(goal_index));
        let left = Vector2::new(-heading_rad.sin(), heading_rad.cos());

        let half = (self.params.num_paths / 2) as f64;

        (0..self.params.num_paths)
            .map(|i| GoalState {
                position_m: centre_m + left * ((i as f64 - half) * self.params.path_offset_m),
                heading_rad,
                speed_ms: goal_state.speed_ms,
            })
            .collect()
    }

    /// Plan a path in the ego-local frame to each goal state.
    ///
    /// Returns one slot per goal, slots whose solve failed or which violate
    /// the curvature or length limits are marked invalid.
    pub fn plan_paths(&self, goal_state_set: &[GoalState]) -> CandidatePaths {
        let mut paths = CandidatePaths::with_capacity(goal_state_set.len());

        for (i, goal) in goal_state_set.iter().enumerate() {
            match self.plan_path(goal) {
                Some(path) => paths.push(path, true),
                None => {
                    trace!("Path {} to ({:.2}, {:.2}) is invalid", i, goal.position_m.x, goal.position_m.y);
                    paths.push(Path::new_empty(), false)
                }
            }
        }

        paths
    }

    /// Transform all valid paths from the ego-local frame into the world
    /// frame.
    pub fn transform_paths(&self, paths: &CandidatePaths, ego: &EgoState) -> CandidatePaths {
        transform_paths(paths, ego)
    }

    fn plan_path(&self, goal: &GoalState) -> Option<Path> {
        let p = &self.params;

        // Only goals ahead of the ego can be reached without reversing
        if goal.position_m.x <= 0.0 {
            return None;
        }

        let spiral = CubicSpiral::solve(&goal.position_m, goal.heading_rad)?;

        if spiral.sf_m > p.max_path_length_m {
            return None;
        }

        let samples = spiral.sample(p.path_step_m);

        if samples
            .iter()
            .any(|s| s.curvature_inv_m.abs() > p.max_curvature_inv_m)
        {
            return None;
        }

        let end = samples.last()?;
        if (end.position_m - goal.position_m).norm() > p.goal_tolerance_m
            || abs_ang_dist(end.heading_rad, goal.heading_rad) > p.goal_heading_tolerance_rad
        {
            return None;
        }

        let mut path = Path::new_empty();
        for s in samples.iter() {
            path.push(s.position_m, s.heading_rad);
        }

        Some(path)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Apply the ego pose to every valid path, taking it from the ego-local
/// frame to the world frame. Invalid slots are copied unchanged.
pub fn transform_paths(paths: &CandidatePaths, ego: &EgoState) -> CandidatePaths {
    let to_world = Transform2::from_pose(&ego.pose);

    let mut out = CandidatePaths::with_capacity(paths.len());
    for (path, &valid) in paths.paths.iter().zip(paths.valid.iter()) {
        if valid {
            out.push(path.transformed(&to_world), true);
        } else {
            out.push(path.clone(), false);
        }
    }

    out
}
