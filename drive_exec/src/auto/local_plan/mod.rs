//! # Local planning module
//!
//! The local planner produces the short horizon reference the trajectory
//! controller tracks. Each planning tick:
//!
//! 1. The [`PathGenerator`] spreads a set of goal states laterally around the
//!    behaviour planner's goal and solves a path from the ego to each.
//! 2. The [`CollisionChecker`] screens the paths against the obstacles and
//!    picks the best collision free one. If there is none the previous best
//!    path is reused.
//! 3. The [`VelocityPlanner`] assigns a speed to each sample of the chosen
//!    path.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod collision;
mod params;
mod path_gen;
mod spiral;
mod velocity;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, warn};

pub use collision::CollisionChecker;
pub use params::{CollisionParams, LocalPlanParams, PathGenParams, VelocityParams};
pub use path_gen::{transform_paths, PathGenerator};
pub use spiral::{CubicSpiral, SpiralSample};
pub use velocity::{LeadVehicle, VelocityPlanner};

use super::{behav_plan::GoalState, path::Path};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The candidate paths of one planning tick.
///
/// There is one slot per goal state. Invalid slots hold an empty path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePaths {
    pub paths: Vec<Path>,
    pub valid: Vec<bool>,
}

/// The local planner, owning its three components and the memory of the
/// previous best path.
pub struct LocalPlanner {
    pub path_generator: PathGenerator,
    pub collision_checker: CollisionChecker,
    pub velocity_planner: VelocityPlanner,

    /// The last path selected, used when no path is collision free
    prev_best_path: Option<Path>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LocalPlanError {
    #[error("The number of paths must be odd and non-zero, got {0}")]
    InvalidNumPaths(usize),

    #[error("Got {offsets} circle offsets but {radii} circle radii")]
    CircleConfigMismatch { offsets: usize, radii: usize },

    #[error("At least one collision circle is required")]
    NoCircles,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CandidatePaths {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            paths: Vec::with_capacity(capacity),
            valid: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, path: Path, valid: bool) {
        self.paths.push(path);
        self.valid.push(valid);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn num_valid(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// The path in the given slot, if it is valid.
    pub fn get(&self, index: usize) -> Option<&Path> {
        match self.valid.get(index) {
            Some(true) => self.paths.get(index),
            _ => None,
        }
    }
}

impl LocalPlanner {
    pub fn new(params: &LocalPlanParams) -> Result<Self, LocalPlanError> {
        let num_paths = params.path_gen.num_paths;
        if num_paths == 0 || num_paths % 2 == 0 {
            return Err(LocalPlanError::InvalidNumPaths(num_paths));
        }

        Ok(Self {
            path_generator: PathGenerator::new(params.path_gen.clone()),
            collision_checker: CollisionChecker::new(&params.collision)?,
            velocity_planner: VelocityPlanner::new(params.velocity.clone()),
            prev_best_path: None,
        })
    }

    pub fn prev_best_path(&self) -> Option<&Path> {
        self.prev_best_path.as_ref()
    }

    /// Choose the path to follow this tick.
    ///
    /// Returns the selected index and path. If no path is collision free the
    /// index is `None` and the previous best path (if any) is returned.
    pub fn select_path(
        &mut self,
        paths: &CandidatePaths,
        collision_free: &[bool],
        goal_state: &GoalState,
    ) -> (Option<usize>, Option<Path>) {
        match self
            .collision_checker
            .select_best_path_index(paths, collision_free, goal_state)
        {
            Some(i) => {
                debug!("Selected path {} of {}", i, paths.len());
                let best = paths.paths[i].clone();
                self.prev_best_path = Some(best.clone());
                (Some(i), Some(best))
            }
            None => {
                warn!(
                    "No collision free path ({} valid of {}), using the previous best path",
                    paths.num_valid(),
                    paths.len()
                );
                (None, self.prev_best_path.clone())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn test_new_validates() {
        let mut params = LocalPlanParams::default();
        assert!(LocalPlanner::new(&params).is_ok());

        params.path_gen.num_paths = 6;
        assert!(matches!(
            LocalPlanner::new(&params),
            Err(LocalPlanError::InvalidNumPaths(6))
        ));

        params.path_gen.num_paths = 7;
        params.collision.circle_radii_m.pop();
        assert!(matches!(
            LocalPlanner::new(&params),
            Err(LocalPlanError::CircleConfigMismatch { .. })
        ));
    }

    #[test]
    fn test_select_path_fallback() {
        let mut lp = LocalPlanner::new(&LocalPlanParams::default()).unwrap();
        let goal = GoalState {
            position_m: Vector2::new(10.0, 0.0),
            heading_rad: 0.0,
            speed_ms: 5.0,
        };

        let mut straight = Path::new_empty();
        straight.push(Vector2::new(0.0, 0.0), 0.0);
        straight.push(Vector2::new(10.0, 0.0), 0.0);

        let mut paths = CandidatePaths::default();
        paths.push(straight.clone(), true);

        // Nothing selected yet, no fallback
        assert_eq!(lp.select_path(&paths, &[false], &goal), (None, None));

        assert_eq!(lp.select_path(&paths, &[true], &goal), (Some(0), Some(straight.clone())));

        // All blocked, fall back to the previous best
        let (index, path) = lp.select_path(&paths, &[false], &goal);
        assert_eq!(index, None);
        assert_eq!(path, Some(straight));
        assert!(paths.get(0).is_some());
    }
}
