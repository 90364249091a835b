//! # Path
//!
//! This module defines the paths and speed profiles used by the autonomy
//! system.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use super::geom::Transform2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A sampled path, each sample carrying a position and the heading of the
/// path at that position.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Path {
    pub points_m: Vec<Vector2<f64>>,
    pub headings_rad: Vec<f64>,
}

/// A segment between two path points
#[derive(Default, Serialize, Deserialize, Debug, Clone, Copy)]
pub struct PathSegment {
    /// The target of the segment
    pub target_m: Vector2<f64>,

    /// The start point of the segment
    pub start_m: Vector2<f64>,

    /// The length of the segment
    pub length_m: f64,

    /// The heading (angle to the +ve x axis) of the segment
    pub heading_rad: f64,

    /// Unit vector pointing in the direction of the segment
    pub direction: Vector2<f64>,
}

/// A point of a speed profile, the speed the vehicle should have when passing
/// through the position.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct ProfilePoint {
    pub position_m: Vector2<f64>,
    pub speed_ms: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Path {
    /// Create a new empty path
    pub fn new_empty() -> Self {
        Path::default()
    }

    /// Push a new sample onto the end of the path.
    pub fn push(&mut self, point_m: Vector2<f64>, heading_rad: f64) {
        self.points_m.push(point_m);
        self.headings_rad.push(heading_rad);
    }

    /// Returns a copy of this path with the transform applied to every sample.
    pub fn transformed(&self, transform: &Transform2) -> Self {
        Path {
            points_m: self
                .points_m
                .iter()
                .map(|p| transform.apply_point(p))
                .collect(),
            headings_rad: self
                .headings_rad
                .iter()
                .map(|&h| transform.apply_heading(h))
                .collect(),
        }
    }

    /// Get the number of points in the path
    pub fn get_num_points(&self) -> usize {
        self.points_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points_m.is_empty()
    }

    /// The final sample of the path, if any.
    pub fn last(&self) -> Option<(Vector2<f64>, f64)> {
        Some((*self.points_m.last()?, *self.headings_rad.last()?))
    }
}

impl ProfilePoint {
    pub fn new(x_m: f64, y_m: f64, speed_ms: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            speed_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the segment from `start` to `target`.
///
/// Returns `None` if the two points coincide, as such a segment has no
/// direction.
pub fn segment_between(start: &Vector2<f64>, target: &Vector2<f64>) -> Option<PathSegment> {
    let delta = target - start;
    let length_m = delta.norm();

    if length_m <= std::f64::EPSILON {
        return None;
    }

    Some(PathSegment {
        target_m: *target,
        start_m: *start,
        length_m,
        heading_rad: delta.y.atan2(delta.x),
        direction: delta / length_m,
    })
}
