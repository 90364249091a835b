//! # Collision checker
//!
//! The vehicle footprint is approximated by a set of circles placed along
//! the path heading at each path sample. A path collides if any obstacle
//! point falls inside any circle at any sample.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use ordered_float::OrderedFloat;

use super::{CandidatePaths, CollisionParams, LocalPlanError};
use crate::auto::{behav_plan::GoalState, path::Path};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CollisionChecker {
    circle_offsets_m: Vec<f64>,
    circle_radii_m: Vec<f64>,
    path_select_weight: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CollisionChecker {
    /// Create a new checker.
    ///
    /// There must be one radius per circle offset, and at least one circle.
    pub fn new(params: &CollisionParams) -> Result<Self, LocalPlanError> {
        if params.circle_offsets_m.len() != params.circle_radii_m.len() {
            return Err(LocalPlanError::CircleConfigMismatch {
                offsets: params.circle_offsets_m.len(),
                radii: params.circle_radii_m.len(),
            });
        }

        if params.circle_offsets_m.is_empty() {
            return Err(LocalPlanError::NoCircles);
        }

        Ok(Self {
            circle_offsets_m: params.circle_offsets_m.clone(),
            circle_radii_m: params.circle_radii_m.clone(),
            path_select_weight: params.path_select_weight,
        })
    }

    /// Check each path against the vehicle obstacle points.
    ///
    /// Returns one entry per path slot, `true` if the path is collision
    /// free. Invalid slots are never collision free.
    pub fn collision_check(&self, paths: &CandidatePaths, obstacles_m: &[Vector2<f64>]) -> Vec<bool> {
        self.check_all(paths, obstacles_m)
    }

    /// Check each path against the pedestrian boundary points.
    ///
    /// Uses the same footprint as [`CollisionChecker::collision_check`], the
    /// result is interpreted by the pedestrian prediction rule rather than
    /// used to veto paths.
    pub fn collision_check_pedestrian(
        &self,
        paths: &CandidatePaths,
        pedestrians_m: &[Vector2<f64>],
    ) -> Vec<bool> {
        self.check_all(paths, pedestrians_m)
    }

    /// Select the best collision free path.
    ///
    /// The score of a path is the lateral distance of its end from the goal
    /// plus the path select weight times its index distance from the centre
    /// path. Returns `None` if no path is collision free.
    pub fn select_best_path_index(
        &self,
        paths: &CandidatePaths,
        collision_free: &[bool],
        goal_state: &GoalState,
    ) -> Option<usize> {
        let centre = paths.len() / 2;
        let left = Vector2::new(-goal_state.heading_rad.sin(), goal_state.heading_rad.cos());

        paths
            .paths
            .iter()
            .enumerate()
            .filter(|(i, _)| collision_free.get(*i).copied().unwrap_or(false))
            .filter_map(|(i, path)| {
                let (end_m, _) = path.last()?;
                let lateral_m = (end_m - goal_state.position_m).dot(&left).abs();
                let centre_dist = (i as f64 - centre as f64).abs();

                Some((i, lateral_m + self.path_select_weight * centre_dist))
            })
            .min_by_key(|(_, score)| OrderedFloat(*score))
            .map(|(i, _)| i)
    }

    fn check_all(&self, paths: &CandidatePaths, points_m: &[Vector2<f64>]) -> Vec<bool> {
        paths
            .paths
            .iter()
            .zip(paths.valid.iter())
            .map(|(path, &valid)| valid && !self.path_collides(path, points_m))
            .collect()
    }

    fn path_collides(&self, path: &Path, points_m: &[Vector2<f64>]) -> bool {
        if points_m.is_empty() {
            return false;
        }

        path.points_m
            .iter()
            .zip(path.headings_rad.iter())
            .any(|(sample_m, &heading_rad)| {
                let dir = Vector2::new(heading_rad.cos(), heading_rad.sin());

                self.circle_offsets_m
                    .iter()
                    .zip(self.circle_radii_m.iter())
                    .any(|(&offset_m, &radius_m)| {
                        let centre_m = sample_m + dir * offset_m;
                        points_m.iter().any(|p| (p - centre_m).norm() <= radius_m)
                    })
            })
    }
}
