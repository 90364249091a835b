//! # Cubic spiral paths
//!
//! A cubic spiral is a path whose curvature is a cubic polynomial of arc
//! length. The spirals used here start at the origin with zero heading and
//! zero curvature and end with zero curvature, leaving the curvature at one
//! and two thirds of the length (`p1`, `p2`) and the length itself (`sf`)
//! free. These three unknowns are found so that the spiral ends at a given
//! position and heading.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, Vector2, Vector3};
use util::maths::wrap_to_pi;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Integration steps used while solving
const SOLVE_STEPS: usize = 100;

/// Maximum number of Newton iterations
const MAX_ITERS: usize = 50;

/// Maximum number of step halvings in one iteration
const MAX_BACKTRACKS: usize = 20;

/// Residual norm at which the solve is converged
const RESIDUAL_TOL: f64 = 1e-4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CubicSpiral {
    /// Curvature at one third of the length
    pub p1: f64,

    /// Curvature at two thirds of the length
    pub p2: f64,

    /// Total arc length
    pub sf_m: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SpiralSample {
    pub position_m: Vector2<f64>,
    pub heading_rad: f64,
    pub curvature_inv_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CubicSpiral {
    /// Polynomial coefficients of the curvature, lowest power first.
    fn coeffs(&self) -> [f64; 4] {
        let sf = self.sf_m;
        [
            0.0,
            (9.0 * self.p1 - 4.5 * self.p2) / sf,
            (-22.5 * self.p1 + 18.0 * self.p2) / (sf * sf),
            (13.5 * self.p1 - 13.5 * self.p2) / (sf * sf * sf),
        ]
    }

    pub fn curvature(&self, s_m: f64) -> f64 {
        let a = self.coeffs();
        a[0] + s_m * (a[1] + s_m * (a[2] + s_m * a[3]))
    }

    pub fn heading(&self, s_m: f64) -> f64 {
        let a = self.coeffs();
        s_m * (a[0] + s_m * (a[1] / 2.0 + s_m * (a[2] / 3.0 + s_m * a[3] / 4.0)))
    }

    /// Heading at the end of the spiral, in closed form.
    pub fn end_heading(&self) -> f64 {
        0.375 * self.sf_m * (self.p1 + self.p2)
    }

    /// Integrate the spiral with `steps` trapezoidal steps, returning
    /// `steps + 1` samples from the start to the end.
    pub fn integrate(&self, steps: usize) -> Vec<SpiralSample> {
        let steps = steps.max(1);
        let h = self.sf_m / steps as f64;

        let mut samples = Vec::with_capacity(steps + 1);
        let mut position_m = Vector2::zeros();
        let mut prev_heading = 0.0f64;

        samples.push(SpiralSample {
            position_m,
            heading_rad: 0.0,
            curvature_inv_m: 0.0,
        });

        for k in 1..=steps {
            let s = h * k as f64;
            let heading = self.heading(s);

            position_m += Vector2::new(
                prev_heading.cos() + heading.cos(),
                prev_heading.sin() + heading.sin(),
            ) * (h / 2.0);

            samples.push(SpiralSample {
                position_m,
                heading_rad: heading,
                curvature_inv_m: self.curvature(s),
            });

            prev_heading = heading;
        }

        samples
    }

    /// Sample the spiral with at most `step_m` between samples.
    pub fn sample(&self, step_m: f64) -> Vec<SpiralSample> {
        const SUB_STEPS: usize = 4;

        let segments = ((self.sf_m / step_m.max(1e-3)).ceil() as usize).max(1);

        self.integrate(segments * SUB_STEPS)
            .into_iter()
            .step_by(SUB_STEPS)
            .collect()
    }

    /// Solve for the spiral ending at `goal_m` with heading `goal_heading_rad`.
    ///
    /// Uses Newton's method with a finite difference Jacobian and a
    /// backtracking line search. Returns `None` if the solve does not
    /// converge.
    pub fn solve(goal_m: &Vector2<f64>, goal_heading_rad: f64) -> Option<Self> {
        let chord_m = goal_m.norm();
        if chord_m < 1e-6 {
            return None;
        }

        // Initial guess of constant curvature over the chord length
        let p = goal_heading_rad / (0.75 * chord_m);
        let mut q = Vector3::new(p, p, chord_m);
        let mut r = residual(&q, goal_m, goal_heading_rad);

        for _ in 0..MAX_ITERS {
            let err = r.norm();
            if err < RESIDUAL_TOL {
                return Some(Self::from_vec(&q));
            }

            let mut jac = Matrix3::zeros();
            for j in 0..3 {
                let h = 1e-6 * q[j].abs().max(1.0);
                let mut q_h = q;
                q_h[j] += h;
                let col = (residual(&q_h, goal_m, goal_heading_rad) - r) / h;
                jac.set_column(j, &col);
            }

            let step = jac.lu().solve(&(-r))?;

            // Halve the step until the residual decreases and the length
            // stays positive
            let mut alpha = 1.0;
            let mut accepted = false;
            for _ in 0..MAX_BACKTRACKS {
                let q_new = q + step * alpha;
                if q_new[2] > 0.0 {
                    let r_new = residual(&q_new, goal_m, goal_heading_rad);
                    if r_new.norm() < err {
                        q = q_new;
                        r = r_new;
                        accepted = true;
                        break;
                    }
                }
                alpha *= 0.5;
            }

            if !accepted {
                return None;
            }
        }

        if r.norm() < RESIDUAL_TOL {
            Some(Self::from_vec(&q))
        } else {
            None
        }
    }

    fn from_vec(q: &Vector3<f64>) -> Self {
        Self {
            p1: q[0],
            p2: q[1],
            sf_m: q[2],
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Difference between the end of the spiral `q` and the goal.
fn residual(q: &Vector3<f64>, goal_m: &Vector2<f64>, goal_heading_rad: f64) -> Vector3<f64> {
    let spiral = CubicSpiral::from_vec(q);

    let end = spiral
        .integrate(SOLVE_STEPS)
        .last()
        .map(|s| s.position_m)
        .unwrap_or_else(Vector2::zeros);

    Vector3::new(
        end.x - goal_m.x,
        end.y - goal_m.y,
        wrap_to_pi(spiral.end_heading() - goal_heading_rad),
    )
}
