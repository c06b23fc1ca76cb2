//! Auxiliary data carried next to the estimated state.
//!
//! Nothing in here is part of the tangent vector or the covariance. The
//! per-slot scratch entries are indexed exactly like the feature slots so the
//! vision front end can keep alignment bookkeeping next to each feature.

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::depth::DepthMap;
use crate::error::{Result, StateError};
use crate::geometry::{BearingVector, CameraExtrinsics};

/// Where camera extrinsics are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtrinsicsMode {
    /// Extrinsics are state blocks and are estimated online.
    #[default]
    Estimated,
    /// Extrinsics are held at the values in the auxiliary cache.
    Fixed,
}

/// Per-slot alignment scratch used by patch tracking and measurement generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureScratch {
    /// Reduced Jacobian of patch intensities w.r.t. pixel coordinates.
    pub a_red: Matrix2<f64>,
    /// Reduced intensity residual.
    pub b_red: Vector2<f64>,
    /// Bearing measured by the last alignment.
    pub bearing_meas: BearingVector,
    /// Patch corner directions in bearing coordinates.
    pub bearing_corners: [Vector2<f64>; 2],
    /// Camera that owns the feature.
    pub cam_id: usize,
}

impl Default for FeatureScratch {
    fn default() -> Self {
        Self {
            a_red: Matrix2::identity(),
            b_red: Vector2::zeros(),
            bearing_meas: BearingVector::identity(),
            bearing_corners: [Vector2::zeros(); 2],
            cam_id: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateAuxiliary {
    /// Estimated body rotational rate.
    pub rate_est: Vector3<f64>,
    /// Measured body rotational rate.
    pub rate_meas: Vector3<f64>,
    pub rate_meas_cov: Matrix3<f64>,
    scratch: Vec<FeatureScratch>,
    fixed_extrinsics: Vec<CameraExtrinsics>,
    pub extrinsics_mode: ExtrinsicsMode,
    pub depth_map: DepthMap,
    /// Slot currently handled by the tracking step.
    pub active_feature: usize,
    /// Camera currently handled by the tracking step.
    pub active_camera_counter: usize,
}

impl StateAuxiliary {
    pub fn new(n_cam: usize, n_max: usize) -> Self {
        Self {
            rate_est: Vector3::zeros(),
            rate_meas: Vector3::zeros(),
            rate_meas_cov: Matrix3::identity(),
            scratch: vec![FeatureScratch::default(); n_max],
            fixed_extrinsics: vec![CameraExtrinsics::identity(); n_cam],
            extrinsics_mode: ExtrinsicsMode::Estimated,
            depth_map: DepthMap::default(),
            active_feature: 0,
            active_camera_counter: 0,
        }
    }

    /// Check the per-camera and per-slot tables against the expected sizes.
    pub(crate) fn check_shape(&self, n_cam: usize, n_max: usize) -> Result<()> {
        for (expected, actual) in [
            (n_max, self.scratch.len()),
            (n_cam, self.fixed_extrinsics.len()),
        ] {
            if expected != actual {
                return Err(StateError::DimensionMismatch { expected, actual });
            }
        }
        Ok(())
    }

    pub fn scratch(&self, slot: usize) -> Result<&FeatureScratch> {
        let capacity = self.scratch.len();
        self.scratch
            .get(slot)
            .ok_or(StateError::SlotOutOfRange { slot, capacity })
    }

    pub fn scratch_mut(&mut self, slot: usize) -> Result<&mut FeatureScratch> {
        let capacity = self.scratch.len();
        self.scratch
            .get_mut(slot)
            .ok_or(StateError::SlotOutOfRange { slot, capacity })
    }

    /// Reset the scratch entry of a slot to its defaults.
    pub fn clear_scratch(&mut self, slot: usize) -> Result<()> {
        *self.scratch_mut(slot)? = FeatureScratch::default();
        Ok(())
    }

    pub fn fixed_extrinsics(&self, camera: usize) -> Result<&CameraExtrinsics> {
        let num_cameras = self.fixed_extrinsics.len();
        self.fixed_extrinsics
            .get(camera)
            .ok_or(StateError::CameraOutOfRange { camera, num_cameras })
    }

    pub fn set_fixed_extrinsics(
        &mut self,
        camera: usize,
        extrinsics: CameraExtrinsics,
    ) -> Result<()> {
        let num_cameras = self.fixed_extrinsics.len();
        let entry = self
            .fixed_extrinsics
            .get_mut(camera)
            .ok_or(StateError::CameraOutOfRange { camera, num_cameras })?;
        *entry = extrinsics;
        Ok(())
    }
}
