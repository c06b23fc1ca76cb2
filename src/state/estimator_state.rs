//! Mean state of the visual-inertial filter.
//!
//! Frame conventions:
//! - `position` points from the world origin to the body (IMU), world frame.
//! - `velocity` is the body velocity expressed in the body frame.
//! - `attitude` rotates body coordinates into world coordinates.
//! - camera extrinsics hold the body-to-camera translation (body frame) and
//!   the body-to-camera rotation.
//! - bearings are expressed in the frame of the camera that owns the feature.

use nalgebra::{DVector, UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::auxiliary::{ExtrinsicsMode, StateAuxiliary};
use super::layout::{BlockKind, StateLayout};
use crate::depth::DepthValues;
use crate::error::{Result, StateError};
use crate::geometry::so3;
use crate::geometry::{BearingVector, CameraExtrinsics};

/// Depth parameter of a slot that holds no feature.
pub const NEUTRAL_DEPTH_PARAMETER: f64 = 1.0;

/// A camera extrinsic value together with the source it was read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrinsicsReading<T> {
    pub value: T,
    pub mode: ExtrinsicsMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorState {
    layout: StateLayout,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
    pub attitude: UnitQuaternion<f64>,
    extrinsics: Vec<CameraExtrinsics>,
    depth: Vec<f64>,
    bearing: Vec<BearingVector>,
    pub aux: StateAuxiliary,
}

impl EstimatorState {
    /// Zero kinematics, identity rotations, every feature slot neutral.
    pub fn new(n_cam: usize, n_max: usize) -> Self {
        Self {
            layout: StateLayout::filter(n_cam, n_max),
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
            attitude: UnitQuaternion::identity(),
            extrinsics: vec![CameraExtrinsics::identity(); n_cam],
            depth: vec![NEUTRAL_DEPTH_PARAMETER; n_max],
            bearing: vec![BearingVector::identity(); n_max],
            aux: StateAuxiliary::new(n_cam, n_max),
        }
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Tangent dimension, equal to the covariance dimension.
    pub fn dimension(&self) -> usize {
        self.layout.dimension()
    }

    /// Feature slot capacity.
    pub fn n_max(&self) -> usize {
        self.depth.len()
    }

    pub fn n_cam(&self) -> usize {
        self.extrinsics.len()
    }

    pub fn world_position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn body_velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    pub fn accel_bias(&self) -> Vector3<f64> {
        self.accel_bias
    }

    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.gyro_bias
    }

    /// Body-to-world rotation.
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.attitude
    }

    pub fn extrinsics_mode(&self) -> ExtrinsicsMode {
        self.aux.extrinsics_mode
    }

    pub fn set_extrinsics_mode(&mut self, mode: ExtrinsicsMode) {
        self.aux.extrinsics_mode = mode;
    }

    /// Extrinsics of `camera` from the source selected by the extrinsics mode.
    pub fn camera_extrinsics(&self, camera: usize) -> Result<ExtrinsicsReading<CameraExtrinsics>> {
        let mode = self.aux.extrinsics_mode;
        let value = match mode {
            ExtrinsicsMode::Estimated => *self.estimated_extrinsics(camera)?,
            ExtrinsicsMode::Fixed => *self.aux.fixed_extrinsics(camera)?,
        };
        Ok(ExtrinsicsReading { value, mode })
    }

    /// Body-to-camera rotation of `camera`.
    pub fn camera_orientation(
        &self,
        camera: usize,
    ) -> Result<ExtrinsicsReading<UnitQuaternion<f64>>> {
        let reading = self.camera_extrinsics(camera)?;
        Ok(ExtrinsicsReading {
            value: reading.value.rotation,
            mode: reading.mode,
        })
    }

    /// Body-to-camera translation of `camera`, body frame.
    pub fn camera_offset(&self, camera: usize) -> Result<ExtrinsicsReading<Vector3<f64>>> {
        let reading = self.camera_extrinsics(camera)?;
        Ok(ExtrinsicsReading {
            value: reading.value.translation,
            mode: reading.mode,
        })
    }

    /// Camera position in the world frame.
    pub fn world_camera_position(&self, camera: usize) -> Result<Vector3<f64>> {
        let offset = self.camera_offset(camera)?.value;
        Ok(self.position + self.attitude * offset)
    }

    /// World-to-camera rotation.
    pub fn world_to_camera_orientation(&self, camera: usize) -> Result<UnitQuaternion<f64>> {
        let q_cam_body = self.camera_orientation(camera)?.value;
        Ok(q_cam_body * self.attitude.inverse())
    }

    /// Extrinsics state block of `camera`, regardless of the extrinsics mode.
    pub fn estimated_extrinsics(&self, camera: usize) -> Result<&CameraExtrinsics> {
        let num_cameras = self.extrinsics.len();
        self.extrinsics
            .get(camera)
            .ok_or(StateError::CameraOutOfRange { camera, num_cameras })
    }

    pub fn estimated_extrinsics_mut(&mut self, camera: usize) -> Result<&mut CameraExtrinsics> {
        let num_cameras = self.extrinsics.len();
        self.extrinsics
            .get_mut(camera)
            .ok_or(StateError::CameraOutOfRange { camera, num_cameras })
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.depth.len() {
            return Err(StateError::SlotOutOfRange {
                slot,
                capacity: self.depth.len(),
            });
        }
        Ok(())
    }

    pub fn depth_parameter(&self, slot: usize) -> Result<f64> {
        self.check_slot(slot)?;
        Ok(self.depth[slot])
    }

    pub fn set_depth_parameter(&mut self, slot: usize, p: f64) -> Result<()> {
        self.check_slot(slot)?;
        self.depth[slot] = p;
        Ok(())
    }

    pub fn bearing(&self, slot: usize) -> Result<&BearingVector> {
        self.check_slot(slot)?;
        Ok(&self.bearing[slot])
    }

    pub fn bearing_mut(&mut self, slot: usize) -> Result<&mut BearingVector> {
        self.check_slot(slot)?;
        Ok(&mut self.bearing[slot])
    }

    /// Unit bearing of the feature in slot `slot`.
    pub fn feature_bearing(&self, slot: usize) -> Result<Vector3<f64>> {
        Ok(self.bearing(slot)?.vector())
    }

    /// Physical depth of the feature in slot `slot`.
    pub fn feature_depth(&self, slot: usize) -> Result<f64> {
        Ok(self.feature_depth_values(slot)?.depth)
    }

    /// Depth and its derivatives w.r.t. the stored parameter.
    pub fn feature_depth_values(&self, slot: usize) -> Result<DepthValues> {
        let p = self.depth_parameter(slot)?;
        Ok(self.aux.depth_map.evaluate(p))
    }

    /// Check that every block vector matches the layout, and that the layout
    /// is the filter layout for this camera and slot count. Deserialized
    /// states must pass this before use.
    pub fn validate(&self) -> Result<()> {
        let (n_cam, n_max) = (self.n_cam(), self.n_max());
        let expected = StateLayout::filter(n_cam, n_max);
        if self.layout != expected {
            return Err(StateError::DimensionMismatch {
                expected: expected.dimension(),
                actual: self.layout.dimension(),
            });
        }
        for (kind, actual) in [
            (BlockKind::ExtrinsicTranslation, self.extrinsics.len()),
            (BlockKind::Depth, self.depth.len()),
            (BlockKind::Bearing, self.bearing.len()),
        ] {
            let expected = self.layout.count(kind);
            if expected != actual {
                return Err(StateError::DimensionMismatch { expected, actual });
            }
        }
        self.aux.check_shape(n_cam, n_max)
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        let expected = self.dimension();
        if actual != expected {
            return Err(StateError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    /// Apply a tangent-space increment laid out by [`layout`](Self::layout).
    pub fn boxplus(&self, delta: &DVector<f64>) -> Result<Self> {
        self.check_dimension(delta.len())?;
        let mut out = self.clone();
        let v3 = |offset: usize| delta.fixed_rows::<3>(offset).into_owned();

        out.position += v3(self.layout.offset(BlockKind::Position, 0)?);
        out.velocity += v3(self.layout.offset(BlockKind::Velocity, 0)?);
        out.accel_bias += v3(self.layout.offset(BlockKind::AccelBias, 0)?);
        out.gyro_bias += v3(self.layout.offset(BlockKind::GyroBias, 0)?);
        out.attitude = so3::exp(&v3(self.layout.offset(BlockKind::Attitude, 0)?)) * self.attitude;

        for (cam, ext) in out.extrinsics.iter_mut().enumerate() {
            ext.translation += v3(self.layout.offset(BlockKind::ExtrinsicTranslation, cam)?);
            let phi = v3(self.layout.offset(BlockKind::ExtrinsicRotation, cam)?);
            ext.rotation = so3::exp(&phi) * ext.rotation;
        }
        for slot in 0..self.n_max() {
            out.depth[slot] += delta[self.layout.offset(BlockKind::Depth, slot)?];
            let offset = self.layout.offset(BlockKind::Bearing, slot)?;
            let d_bearing: Vector2<f64> = delta.fixed_rows::<2>(offset).into_owned();
            out.bearing[slot] = self.bearing[slot].boxplus(&d_bearing);
        }
        Ok(out)
    }

    /// Tangent-space difference `self ⊟ reference`.
    pub fn boxminus(&self, reference: &EstimatorState) -> Result<DVector<f64>> {
        if reference.layout != self.layout {
            return Err(StateError::DimensionMismatch {
                expected: self.dimension(),
                actual: reference.dimension(),
            });
        }
        let mut delta = DVector::zeros(self.dimension());
        let put3 = |delta: &mut DVector<f64>, offset: usize, v: Vector3<f64>| {
            delta.fixed_rows_mut::<3>(offset).copy_from(&v);
        };

        put3(
            &mut delta,
            self.layout.offset(BlockKind::Position, 0)?,
            self.position - reference.position,
        );
        put3(
            &mut delta,
            self.layout.offset(BlockKind::Velocity, 0)?,
            self.velocity - reference.velocity,
        );
        put3(
            &mut delta,
            self.layout.offset(BlockKind::AccelBias, 0)?,
            self.accel_bias - reference.accel_bias,
        );
        put3(
            &mut delta,
            self.layout.offset(BlockKind::GyroBias, 0)?,
            self.gyro_bias - reference.gyro_bias,
        );
        put3(
            &mut delta,
            self.layout.offset(BlockKind::Attitude, 0)?,
            so3::log(&(self.attitude * reference.attitude.inverse())),
        );

        for (cam, (ext, ref_ext)) in self.extrinsics.iter().zip(&reference.extrinsics).enumerate() {
            put3(
                &mut delta,
                self.layout.offset(BlockKind::ExtrinsicTranslation, cam)?,
                ext.translation - ref_ext.translation,
            );
            put3(
                &mut delta,
                self.layout.offset(BlockKind::ExtrinsicRotation, cam)?,
                so3::log(&(ext.rotation * ref_ext.rotation.inverse())),
            );
        }
        for slot in 0..self.n_max() {
            delta[self.layout.offset(BlockKind::Depth, slot)?] =
                self.depth[slot] - reference.depth[slot];
            let offset = self.layout.offset(BlockKind::Bearing, slot)?;
            delta
                .fixed_rows_mut::<2>(offset)
                .copy_from(&self.bearing[slot].boxminus(&reference.bearing[slot]));
        }
        Ok(delta)
    }
}
