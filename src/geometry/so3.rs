//! SO(3) helpers used by the manifold blocks of the filter state.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map: rotation vector to quaternion.
#[inline]
pub fn exp(phi: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*phi)
}

/// Logarithmic map: quaternion to rotation vector.
#[inline]
pub fn log(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    q.scaled_axis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let u = Vector3::new(4.0, 5.0, 6.0);

        assert_relative_eq!(v.cross(&u), skew(&v) * u, epsilon = 1e-12);
    }

    #[test]
    fn test_skew_antisymmetric() {
        let skew_v = skew(&Vector3::new(-0.5, 2.0, 0.25));
        assert_relative_eq!(skew_v, -skew_v.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_log_inverse() {
        let phi = Vector3::new(0.1, -0.2, 0.3);
        assert_relative_eq!(log(&exp(&phi)), phi, epsilon = 1e-12);
    }
}
