//! Unit bearing vectors with a 2-parameter tangent space.
//!
//! A bearing is stored as the rotation `q` that carries the reference axis
//! `e_z` onto the direction: `n = q * e_z`. Increments live in the plane
//! spanned by `q * e_x` and `q * e_y`, so a bearing has two degrees of
//! freedom in the filter while its stored form never drifts off the sphere.

use std::f64::consts::PI;

use nalgebra::{Matrix3x2, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::so3::{exp, skew};
use crate::error::{Result, StateError};

/// Below this norm a vector has no usable direction.
const MIN_BEARING_NORM: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BearingVector {
    rotation: UnitQuaternion<f64>,
}

impl BearingVector {
    /// The reference direction `e_z`.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Bearing pointing along `v`. The length of `v` is irrelevant.
    pub fn from_vector(v: &Vector3<f64>) -> Result<Self> {
        let norm = v.norm();
        if !(norm > MIN_BEARING_NORM) || !norm.is_finite() {
            return Err(StateError::DegenerateBearing(norm));
        }
        let rotation = UnitQuaternion::rotation_between(&Vector3::z(), v).unwrap_or_else(|| {
            // v is antiparallel to e_z.
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI)
        });
        Ok(Self { rotation })
    }

    pub fn set_identity(&mut self) {
        *self = Self::identity();
    }

    pub fn set_from_vector(&mut self, v: &Vector3<f64>) -> Result<()> {
        *self = Self::from_vector(v)?;
        Ok(())
    }

    /// Unit direction.
    pub fn vector(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }

    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.rotation
    }

    /// Orthonormal basis of the tangent plane, columns `q*e_x` and `q*e_y`.
    pub fn tangent_basis(&self) -> Matrix3x2<f64> {
        Matrix3x2::from_columns(&[self.rotation * Vector3::x(), self.rotation * Vector3::y()])
    }

    /// Apply a tangent-plane increment.
    pub fn boxplus(&self, delta: &Vector2<f64>) -> Self {
        let phi = self.tangent_basis() * delta;
        Self {
            rotation: exp(&phi) * self.rotation,
        }
    }

    /// Tangent-plane difference `self ⊟ reference`, expressed in the basis of
    /// `reference`.
    pub fn boxminus(&self, reference: &BearingVector) -> Vector2<f64> {
        let from = reference.vector();
        let to = self.vector();
        let axis = from.cross(&to);
        let sin = axis.norm();
        let cos = from.dot(&to);
        if sin < MIN_BEARING_NORM {
            if cos > 0.0 {
                return Vector2::zeros();
            }
            // Opposite directions: rotate by π about the first tangent axis.
            return Vector2::new(PI, 0.0);
        }
        let angle = sin.atan2(cos);
        reference.tangent_basis().transpose() * (axis / sin * angle)
    }

    /// Derivative of [`vector`](Self::vector) w.r.t. a [`boxplus`](Self::boxplus)
    /// increment at zero.
    pub fn boxplus_jacobian(&self) -> Matrix3x2<f64> {
        -skew(&self.vector()) * self.tangent_basis()
    }
}

impl Default for BearingVector {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_points_along_z() {
        assert_relative_eq!(BearingVector::identity().vector(), Vector3::z(), epsilon = 1e-15);
    }

    #[test]
    fn test_from_vector_normalizes() {
        let v = Vector3::new(3.0, -1.0, 2.0);
        let bearing = BearingVector::from_vector(&v).unwrap();
        assert_relative_eq!(bearing.vector(), v.normalize(), epsilon = 1e-12);

        let down = BearingVector::from_vector(&Vector3::new(0.0, 0.0, -4.0)).unwrap();
        assert_relative_eq!(down.vector(), -Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_vector_rejected() {
        assert!(matches!(
            BearingVector::from_vector(&Vector3::zeros()),
            Err(StateError::DegenerateBearing(_))
        ));
    }

    #[test]
    fn test_boxminus_recovers_increment() {
        let reference = BearingVector::from_vector(&Vector3::new(0.2, 0.1, 1.0)).unwrap();
        let delta = Vector2::new(0.05, -0.12);
        let moved = reference.boxplus(&delta);

        assert_relative_eq!(moved.boxminus(&reference), delta, epsilon = 1e-10);
        assert_relative_eq!(reference.boxminus(&reference), Vector2::zeros(), epsilon = 1e-15);
    }

    #[test]
    fn test_boxplus_jacobian_matches_finite_difference() {
        let bearing = BearingVector::from_vector(&Vector3::new(-0.4, 0.7, 0.5)).unwrap();
        let jac = bearing.boxplus_jacobian();
        let h = 1e-7;
        for i in 0..2 {
            let mut delta = Vector2::zeros();
            delta[i] = h;
            let numeric = (bearing.boxplus(&delta).vector() - bearing.vector()) / h;
            assert_relative_eq!(jac.column(i).into_owned(), numeric, epsilon = 1e-6);
        }
    }
}
