//! Filter state: mean, covariance and the feature-slot lifecycle.
//!
//! The covariance has a fixed dimension for the whole run. Feature slots are
//! reused in place, and a slot that holds no feature keeps a recognizable
//! covariance signature:
//!
//! ```text
//! active slot    [dep, nor] self-block positive definite, arbitrary cross terms
//! inactive slot  dep self-block = 1, nor self-block = I2, every cross term = 0
//! ```
//!
//! The identity signature keeps the free blocks non-singular for the update
//! step, and the zero cross terms keep a reused slot from inheriting
//! correlations of the feature that held it before. Occupancy itself is
//! tracked explicitly in a [`SlotOccupancy`].

use image::{GrayImage, RgbImage};
use nalgebra::{DMatrix, Matrix3, UnitQuaternion, Vector3};
use tracing::{debug, info, warn};

use super::occupancy::SlotOccupancy;
use crate::config::{FilterConfig, InitialCovarianceConfig};
use crate::error::{Result, StateError};
use crate::geometry::BearingVector;
use crate::imu::GRAVITY_MAGNITUDE;
use crate::state::{BlockKind, EstimatorState, NEUTRAL_DEPTH_PARAMETER, StateLayout};

/// Below this norm the accelerometer gives no usable gravity direction.
const MIN_SPECIFIC_FORCE: f64 = 1e-6;

/// Specific-force magnitude error above which the body is likely moving.
const STATIONARY_TOLERANCE: f64 = 1.0;

/// Tolerance on `|C - C^T|` entries.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct FilterState {
    pub state: EstimatorState,
    cov: DMatrix<f64>,
    occupancy: SlotOccupancy,
    /// Last image per camera, kept for drawing.
    pub images: Vec<Option<GrayImage>>,
    pub patch_drawing: Option<RgbImage>,
    /// Timestamp of the last incorporated image (s).
    pub image_time: f64,
    pub image_counter: u64,
    pub use_prediction_merge: bool,
}

impl FilterState {
    /// Default state with identity covariance and every slot free.
    pub fn new(n_cam: usize, n_max: usize) -> Self {
        let state = EstimatorState::new(n_cam, n_max);
        let dim = state.dimension();
        Self {
            state,
            cov: DMatrix::identity(dim, dim),
            occupancy: SlotOccupancy::new(n_max),
            images: vec![None; n_cam],
            patch_drawing: None,
            image_time: 0.0,
            image_counter: 0,
            use_prediction_merge: true,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        config.validate()?;
        let mut filter = Self::new(config.num_cameras, config.max_features);
        filter.state.aux.depth_map.set_encoding(config.depth_type);
        filter.state.set_extrinsics_mode(config.extrinsics_mode);
        filter.use_prediction_merge = config.use_prediction_merge;

        for (cam, ext) in config.extrinsics()?.into_iter().enumerate() {
            *filter.state.estimated_extrinsics_mut(cam)? = ext;
            filter.state.aux.set_fixed_extrinsics(cam, ext)?;
        }
        filter.reset_covariance(&config.initial_covariance);

        info!(
            "Filter state created: {} cameras, {} feature slots, dimension {}, depth {}",
            config.num_cameras,
            config.max_features,
            filter.dimension(),
            config.depth_type
        );
        Ok(filter)
    }

    /// Diagonal covariance from `initial`; feature slots get the free-slot signature.
    pub fn reset_covariance(&mut self, initial: &InitialCovarianceConfig) {
        let dim = self.dimension();
        self.cov = DMatrix::zeros(dim, dim);
        for block in self.state.layout().blocks() {
            let variance = initial.variance(block.kind);
            for i in block.offset..block.offset + block.dim() {
                self.cov[(i, i)] = variance;
            }
        }
        self.occupancy = SlotOccupancy::new(self.state.n_max());
    }

    pub fn dimension(&self) -> usize {
        self.state.dimension()
    }

    pub fn layout(&self) -> &StateLayout {
        self.state.layout()
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.cov
    }

    /// Mutable covariance for the prediction and update steps. The dimension
    /// is fixed; only entries may change.
    pub fn covariance_mut(&mut self) -> &mut DMatrix<f64> {
        &mut self.cov
    }

    pub fn occupancy(&self) -> &SlotOccupancy {
        &self.occupancy
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.occupancy.contains(slot)
    }

    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupancy.iter()
    }

    pub fn active_count(&self) -> usize {
        self.occupancy.count()
    }

    /// Lowest slot that can take a new feature.
    pub fn free_slot(&self) -> Option<usize> {
        self.occupancy.first_free()
    }

    /// Store the latest image of `camera` and advance the image clock.
    pub fn set_image(&mut self, camera: usize, image: GrayImage, time: f64) -> Result<()> {
        let num_cameras = self.images.len();
        let entry = self
            .images
            .get_mut(camera)
            .ok_or(StateError::CameraOutOfRange { camera, num_cameras })?;
        *entry = Some(image);
        self.image_time = time;
        self.image_counter += 1;
        Ok(())
    }

    /// Place the body at `position` (world frame) with the rotation
    /// `body_from_world` taking world coordinates into the body frame.
    pub fn initialize_from_pose(
        &mut self,
        position: Vector3<f64>,
        body_from_world: UnitQuaternion<f64>,
    ) {
        self.state.position = position;
        self.state.attitude = body_from_world.inverse();
        debug!("Initialized pose at [{:.3}, {:.3}, {:.3}]", position.x, position.y, position.z);
    }

    /// Bootstrap the attitude from one accelerometer sample.
    ///
    /// A resting accelerometer measures the reaction to gravity, which points
    /// up in the world. The attitude is set to the smallest rotation carrying
    /// the measured direction onto world `+z`. Heading stays undetermined
    /// (no rotation about `z`) and any linear acceleration or noise in the
    /// sample tilts the result: an error of `|a|` m/s^2 perpendicular to
    /// gravity gives roughly `atan(|a| / g)` of tilt error. Below
    /// `MIN_SPECIFIC_FORCE` the attitude falls back to identity.
    pub fn initialize_from_accelerometer(&mut self, specific_force: &Vector3<f64>) {
        let norm = specific_force.norm();
        if !(norm > MIN_SPECIFIC_FORCE) {
            warn!("Accelerometer norm {:.2e} too small, using identity attitude", norm);
            self.state.attitude = UnitQuaternion::identity();
            return;
        }
        if (norm - GRAVITY_MAGNITUDE).abs() > STATIONARY_TOLERANCE {
            warn!(
                "Accelerometer norm {:.3} differs from gravity, body may not be at rest",
                norm
            );
        }
        self.state.attitude = UnitQuaternion::rotation_between(specific_force, &Vector3::z())
            .unwrap_or_else(|| {
                // Upside down: any half turn about a horizontal axis.
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
            });
        debug!("Initialized attitude from accelerometer: {:?}", self.state.attitude.euler_angles());
    }

    fn feature_indices(&self, slot: usize) -> Result<[usize; 3]> {
        let layout = self.state.layout();
        let dep = layout.offset(BlockKind::Depth, slot)?;
        let nor = layout.offset(BlockKind::Bearing, slot)?;
        Ok([dep, nor, nor + 1])
    }

    fn zero_cross_covariance(&mut self, indices: &[usize; 3]) {
        for &i in indices {
            self.cov.row_mut(i).fill(0.0);
            self.cov.column_mut(i).fill(0.0);
        }
    }

    /// Start tracking a feature in `slot`.
    ///
    /// `depth_parameter` is stored as-is (it is the internal parameter of the
    /// active depth encoding, see [`DepthMap::parameter`](crate::depth::DepthMap::parameter)).
    /// `bearing` need not be normalized. `init_cov` is ordered
    /// `[depth, bearing_1, bearing_2]`. The new feature is uncorrelated with
    /// every other state dimension.
    pub fn initialize_feature(
        &mut self,
        slot: usize,
        bearing: &Vector3<f64>,
        depth_parameter: f64,
        init_cov: &Matrix3<f64>,
    ) -> Result<()> {
        let indices = self.feature_indices(slot)?;
        let bearing = BearingVector::from_vector(bearing)?;
        validate_covariance(init_cov)?;
        if !depth_parameter.is_finite() {
            return Err(StateError::InvalidDepth {
                depth: depth_parameter,
                encoding: self.state.aux.depth_map.encoding().name(),
            });
        }

        self.state.set_depth_parameter(slot, depth_parameter)?;
        *self.state.bearing_mut(slot)? = bearing;

        self.zero_cross_covariance(&indices);
        for (r, &i) in indices.iter().enumerate() {
            for (c, &j) in indices.iter().enumerate() {
                self.cov[(i, j)] = init_cov[(r, c)];
            }
        }

        if !self.occupancy.insert(slot) {
            debug!("Feature slot {} reinitialized while active", slot);
        }
        debug!("Initialized feature slot {} (depth parameter {:.4})", slot, depth_parameter);
        Ok(())
    }

    /// Release `slot`: neutral mean values and the free-slot covariance signature.
    pub fn remove_feature(&mut self, slot: usize) -> Result<()> {
        let indices = self.feature_indices(slot)?;

        self.state.set_depth_parameter(slot, NEUTRAL_DEPTH_PARAMETER)?;
        self.state.bearing_mut(slot)?.set_identity();

        self.zero_cross_covariance(&indices);
        for &i in &indices {
            self.cov[(i, i)] = 1.0;
        }

        if self.occupancy.remove(slot) {
            debug!("Removed feature slot {}", slot);
        }
        Ok(())
    }

    /// 3x3 covariance of a slot ordered `[depth, bearing_1, bearing_2]`.
    pub fn feature_covariance(&self, slot: usize) -> Result<Matrix3<f64>> {
        let indices = self.feature_indices(slot)?;
        Ok(Matrix3::from_fn(|r, c| self.cov[(indices[r], indices[c])]))
    }

    /// Whether the covariance of `slot` carries the free-slot signature.
    pub fn has_free_slot_signature(&self, slot: usize) -> Result<bool> {
        let indices = self.feature_indices(slot)?;
        Ok(free_slot_signature(&self.cov, &indices))
    }

    /// Recover occupancy from covariance contents alone.
    pub fn infer_occupancy(&self) -> SlotOccupancy {
        let mut occupancy = SlotOccupancy::new(self.state.n_max());
        for slot in 0..self.state.n_max() {
            if let Ok(false) = self.has_free_slot_signature(slot) {
                occupancy.insert(slot);
            }
        }
        occupancy
    }

    /// Replace the occupancy record, e.g. after restoring a covariance.
    pub(crate) fn set_occupancy(&mut self, occupancy: SlotOccupancy) -> Result<()> {
        if occupancy.capacity() != self.state.n_max() {
            return Err(StateError::DimensionMismatch {
                expected: self.state.n_max(),
                actual: occupancy.capacity(),
            });
        }
        self.occupancy = occupancy;
        Ok(())
    }

    /// Check symmetry and the per-slot covariance invariants.
    pub fn check_covariance(&self) -> Result<()> {
        let dim = self.dimension();
        if self.cov.nrows() != dim || self.cov.ncols() != dim {
            return Err(StateError::DimensionMismatch {
                expected: dim,
                actual: self.cov.nrows().max(self.cov.ncols()),
            });
        }
        let asymmetry = (&self.cov - self.cov.transpose()).amax();
        if asymmetry > SYMMETRY_TOLERANCE {
            return Err(StateError::InvalidCovariance(format!(
                "covariance not symmetric (max deviation {asymmetry:.3e})"
            )));
        }
        for slot in 0..self.state.n_max() {
            let indices = self.feature_indices(slot)?;
            if self.occupancy.contains(slot) {
                let block = self.feature_covariance(slot)?;
                if block.cholesky().is_none() {
                    return Err(StateError::CovarianceInconsistent {
                        slot,
                        reason: "active feature block is not positive definite".into(),
                    });
                }
            } else if !free_slot_signature(&self.cov, &indices) {
                return Err(StateError::CovarianceInconsistent {
                    slot,
                    reason: "free slot does not carry the identity signature".into(),
                });
            }
        }
        Ok(())
    }
}

fn free_slot_signature(cov: &DMatrix<f64>, indices: &[usize; 3]) -> bool {
    indices.iter().all(|&i| {
        (0..cov.ncols()).all(|j| {
            let expected = if i == j { 1.0 } else { 0.0 };
            cov[(i, j)] == expected && cov[(j, i)] == expected
        })
    })
}

fn validate_covariance(cov: &Matrix3<f64>) -> Result<()> {
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(StateError::InvalidCovariance("non-finite entry".into()));
    }
    if (cov - cov.transpose()).amax() > SYMMETRY_TOLERANCE {
        return Err(StateError::InvalidCovariance("initial block not symmetric".into()));
    }
    if cov.cholesky().is_none() {
        return Err(StateError::InvalidCovariance(
            "initial block not positive definite".into(),
        ));
    }
    Ok(())
}
