//! # Geometry utilities
//!
//! Small fixed-size geometry used throughout the autonomy modules: 2D rigid
//! transforms between the ego-local and world frames, arc-length
//! interpolation of speed profiles, and circle fitting through three points.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use util::maths::wrap_to_pi;

use super::{loc::Pose, path::ProfilePoint};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A 2D rigid transform, a rotation followed by a translation.
///
/// `Transform2::from_pose(&ego)` maps points from the ego-local frame (origin
/// at the ego, +X along its heading) into the world frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform2 {
    rotation: Matrix2<f64>,
    angle_rad: f64,
    translation: Vector2<f64>,
}

/// A circle described by its centre and radius.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Circle {
    pub centre_m: Vector2<f64>,
    pub radius_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Transform2 {
    /// Create a new transform which rotates by `angle_rad` then translates.
    pub fn new(angle_rad: f64, translation: Vector2<f64>) -> Self {
        let (s, c) = angle_rad.sin_cos();
        Self {
            rotation: Matrix2::new(c, -s, s, c),
            angle_rad,
            translation,
        }
    }

    /// The transform from the frame attached to `pose` into the frame the pose is expressed in.
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(pose.heading_rad, pose.position_m)
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.transpose();
        Self {
            rotation,
            angle_rad: -self.angle_rad,
            translation: -(rotation * self.translation),
        }
    }

    pub fn apply_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        self.rotation * point + self.translation
    }

    pub fn apply_heading(&self, heading_rad: f64) -> f64 {
        wrap_to_pi(heading_rad + self.angle_rad)
    }
}

impl Circle {
    /// Fit the circle passing through the three given points.
    ///
    /// Solves `x^2 + y^2 + D x + E y + F = 0` for `D`, `E` and `F`. Returns `None` if the points
    /// are collinear (or coincident), in which case no unique circle exists.
    pub fn through(
        p0: &Vector2<f64>,
        p1: &Vector2<f64>,
        p2: &Vector2<f64>,
    ) -> Option<Self> {
        let a = Matrix3::new(
            p0.x, p0.y, 1.0,
            p1.x, p1.y, 1.0,
            p2.x, p2.y, 1.0,
        );
        let b = Vector3::new(
            -p0.norm_squared(),
            -p1.norm_squared(),
            -p2.norm_squared(),
        );

        // Collinear points give a singular (or nearly singular) system
        let lu = a.lu();
        if lu.determinant().abs() < 1e-9 {
            return None;
        }

        let coeffs = lu.solve(&b)?;

        let centre_m = Vector2::new(-coeffs[0] / 2.0, -coeffs[1] / 2.0);
        let radius_sq = centre_m.norm_squared() - coeffs[2];

        if radius_sq <= 0.0 {
            return None;
        }

        Some(Self {
            centre_m,
            radius_m: radius_sq.sqrt(),
        })
    }

    /// The point on the circle at the given polar angle about the centre.
    pub fn point_at(&self, angle_rad: f64) -> Vector2<f64> {
        self.centre_m + self.radius_m * Vector2::new(angle_rad.cos(), angle_rad.sin())
    }

    /// The polar angle of the given point about the centre.
    pub fn angle_of(&self, point: &Vector2<f64>) -> f64 {
        let d = point - self.centre_m;
        d.y.atan2(d.x)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Linearly interpolate a speed profile so that consecutive points are at most
/// `resolution_m` apart.
///
/// Speeds are interpolated linearly in arc length between the original
/// points. The original points are all kept, and the final point is always
/// the last point of the input.
pub fn interpolate_profile(profile: &[ProfilePoint], resolution_m: f64) -> Vec<ProfilePoint> {
    let mut interp = Vec::with_capacity(profile.len());

    if resolution_m <= 0.0 {
        return profile.to_vec();
    }

    for pair in profile.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        interp.push(*from);

        let delta = to.position_m - from.position_m;
        let dist_m = delta.norm();

        // Zero length segments contribute only their start point
        if dist_m <= std::f64::EPSILON {
            continue;
        }

        let dir = delta / dist_m;
        let speed_per_m = (to.speed_ms - from.speed_ms) / dist_m;

        // Number of points strictly between the start and end of the segment
        let num_interp = ((dist_m / resolution_m).floor() as usize).saturating_sub(1);

        for j in 1..=num_interp {
            let s_m = resolution_m * j as f64;
            interp.push(ProfilePoint {
                position_m: from.position_m + s_m * dir,
                speed_ms: from.speed_ms + s_m * speed_per_m,
            });
        }
    }

    if let Some(last) = profile.last() {
        interp.push(*last);
    }

    interp
}
