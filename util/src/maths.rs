//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Apply polynomial coefficients to a value.
///
/// The order of the coefficients is highest power first, i.e if there are 3
/// coefficients it's a 2nd order polynomial with c[0]*x^2 + c[1]*x + c[2].
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    // Horner's method
    coeffs.iter().fold(T::zero(), |acc, &c| acc * value + c)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the range [-pi, pi).
pub fn wrap_to_pi<T>(angle: T) -> T
where
    T: Float
{
    let pi_t: T = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    rem_euclid(angle + pi_t, tau_t) - pi_t
}

/// Get the absolute angle between two headings, in the range [0, pi].
pub fn abs_ang_dist<T>(a: T, b: T) -> T
where
    T: Float
{
    wrap_to_pi(a - b).abs()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_wrap_to_pi() {
        assert!((wrap_to_pi(0.0f64)).abs() < 1e-12);
        assert!((wrap_to_pi(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_to_pi(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((wrap_to_pi(4.0 * PI + 0.25) - 0.25).abs() < 1e-12);
        assert!((wrap_to_pi(PI) + PI).abs() < 1e-12);
    }

    #[test]
    fn test_abs_ang_dist() {
        assert!((abs_ang_dist(0.1f64, 2.0 * PI - 0.1) - 0.2).abs() < 1e-12);
        assert!((abs_ang_dist(PI / 2.0, -PI / 2.0) - PI).abs() < 1e-12);
    }

    #[test]
    fn test_poly_val() {
        assert_eq!(poly_val(2.0f64, &[1.0, 0.0, -1.0]), 3.0);
        assert_eq!(poly_val(2.0f64, &[]), 0.0);
    }

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((-2.0f64, 2.0), (-1.0, 1.0), 1.0), 0.5);
    }
}
