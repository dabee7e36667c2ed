//! Pose interpolation and extrapolation on SE(3).
//!
//! Poses are `nalgebra::Isometry3<f64>` (unit-quaternion rotation plus
//! translation). Blending is done component-wise: linear interpolation of
//! the translation, spherical interpolation of the rotation. Extrapolation
//! uses a constant-velocity model: the delta between the two newest poses
//! is scaled and applied forward.

use nalgebra::Isometry3;

/// Interpolate between two poses at parameter `alpha` in `[0, 1]`.
///
/// `alpha = 0` returns `a` exactly, `alpha = 1` returns `b` exactly.
pub fn interpolate(a: &Isometry3<f64>, b: &Isometry3<f64>, alpha: f64) -> Isometry3<f64> {
    let translation = a.translation.vector.lerp(&b.translation.vector, alpha);
    let rotation = a.rotation.slerp(&b.rotation, alpha);
    Isometry3::from_parts(translation.into(), rotation)
}

/// Extrapolate past `b` assuming the constant velocity observed from `a` to `b`.
///
/// `alpha` is the step size in units of the `a`-to-`b` interval: `alpha = 1`
/// yields the pose one full interval past `b`, `alpha = 0` returns `b`.
pub fn extrapolate(a: &Isometry3<f64>, b: &Isometry3<f64>, alpha: f64) -> Isometry3<f64> {
    let velocity = b.translation.vector - a.translation.vector;
    let angular = a.rotation.rotation_to(&b.rotation);

    let translation = b.translation.vector + velocity * alpha;
    let rotation = match angular.axis_angle() {
        Some((axis, angle)) => {
            b.rotation * nalgebra::UnitQuaternion::from_axis_angle(&axis, angle * alpha)
        }
        None => b.rotation,
    };
    Isometry3::from_parts(translation.into(), rotation)
}

/// Angular distance between two poses' rotations, in radians.
pub fn rotation_angle_between(a: &Isometry3<f64>, b: &Isometry3<f64>) -> f64 {
    a.rotation.angle_to(&b.rotation)
}

/// Whether two poses differ by less than `epsilon` in both translation
/// (meters) and rotation (radians).
pub fn approx_equal(a: &Isometry3<f64>, b: &Isometry3<f64>, epsilon: f64) -> bool {
    (a.translation.vector - b.translation.vector).norm() < epsilon
        && rotation_angle_between(a, b) < epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn pose(x: f64, y: f64, z: f64, yaw: f64) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw),
        )
    }

    #[test]
    fn test_interpolate_endpoints_exact() {
        let a = pose(0.0, 0.0, 0.0, 0.0);
        let b = pose(2.0, 0.0, 0.0, 1.0);

        assert!(approx_equal(&interpolate(&a, &b, 0.0), &a, 1e-12));
        assert!(approx_equal(&interpolate(&a, &b, 1.0), &b, 1e-12));
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = pose(0.0, 0.0, 0.0, 0.0);
        let b = pose(2.0, 4.0, 0.0, 0.8);
        let mid = interpolate(&a, &b, 0.5);

        assert!((mid.translation.vector - Vector3::new(1.0, 2.0, 0.0)).norm() < 1e-12);
        assert!((mid.rotation.angle() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolate_continues_velocity() {
        let a = pose(0.0, 0.0, 0.0, 0.0);
        let b = pose(1.0, 0.0, 0.0, 0.1);
        let next = extrapolate(&a, &b, 1.0);

        assert!((next.translation.vector - Vector3::new(2.0, 0.0, 0.0)).norm() < 1e-12);
        assert!((next.rotation.angle() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_extrapolate_zero_step_is_identity() {
        let a = pose(0.0, 1.0, 0.0, 0.3);
        let b = pose(1.0, 1.0, 0.5, 0.5);

        assert!(approx_equal(&extrapolate(&a, &b, 0.0), &b, 1e-12));
    }
}
