//! Body-to-camera rigid transforms.

use anyhow::{Result, bail};
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Extrinsic calibration of one camera relative to the IMU/body frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraExtrinsics {
    /// Vector from the body origin to the camera origin, in body coordinates.
    pub translation: Vector3<f64>,
    /// Rotation taking body coordinates to camera coordinates.
    pub rotation: UnitQuaternion<f64>,
}

impl CameraExtrinsics {
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Build from a sensor-to-body homogeneous transform (EuRoC `T_BS`).
    pub fn from_sensor_to_body(t_bs: &Matrix4<f64>) -> Self {
        let r_bs: Matrix3<f64> = t_bs.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation_bs =
            UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_bs));
        Self {
            translation: t_bs.fixed_view::<3, 1>(0, 3).into_owned(),
            rotation: rotation_bs.inverse(),
        }
    }

    /// Row-major 4x4 `T_BS` as stored in EuRoC `sensor.yaml`.
    pub fn from_row_major(data: &[f64]) -> Result<Self> {
        if data.len() != 16 {
            bail!("Expected 16 elements for transform, got {}", data.len());
        }
        Ok(Self::from_sensor_to_body(&Matrix4::from_row_slice(data)))
    }

    /// Express a body-frame point in camera coordinates.
    pub fn body_to_camera(&self, p_body: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * (p_body - self.translation)
    }
}

impl Default for CameraExtrinsics {
    fn default() -> Self {
        Self::identity()
    }
}
