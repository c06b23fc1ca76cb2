//! IMU input and process-noise layout for the time update.

use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};

use super::layout::{BlockKind, StateLayout};
use crate::imu::ImuSample;

/// Raw IMU sample driving one prediction step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionInput {
    /// Specific force, body frame (m/s^2).
    pub acceleration: Vector3<f64>,
    /// Angular velocity, body frame (rad/s).
    pub angular_velocity: Vector3<f64>,
}

impl PredictionInput {
    pub fn new(acceleration: Vector3<f64>, angular_velocity: Vector3<f64>) -> Self {
        Self {
            acceleration,
            angular_velocity,
        }
    }
}

impl From<&ImuSample> for PredictionInput {
    fn from(sample: &ImuSample) -> Self {
        Self::new(sample.accel, sample.gyro)
    }
}

/// Per-block process-noise variances (per second).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessNoiseConfig {
    pub pos: f64,
    pub vel: f64,
    pub acb: f64,
    pub gyb: f64,
    pub att: f64,
    pub vep: f64,
    pub vea: f64,
    pub dep: f64,
    pub nor: f64,
}

impl Default for ProcessNoiseConfig {
    fn default() -> Self {
        Self {
            pos: 1e-4,
            vel: 4e-5,
            acb: 1e-8,
            gyb: 3.8e-7,
            att: 7.6e-7,
            vep: 1e-8,
            vea: 1e-8,
            dep: 1e-4,
            nor: 1e-5,
        }
    }
}

impl ProcessNoiseConfig {
    pub fn variance(&self, kind: BlockKind) -> f64 {
        match kind {
            BlockKind::Position => self.pos,
            BlockKind::Velocity => self.vel,
            BlockKind::AccelBias => self.acb,
            BlockKind::GyroBias => self.gyb,
            BlockKind::Attitude => self.att,
            BlockKind::ExtrinsicTranslation => self.vep,
            BlockKind::ExtrinsicRotation => self.vea,
            BlockKind::Depth => self.dep,
            BlockKind::Bearing => self.nor,
        }
    }
}

/// Process-noise vector layout. Every block mirrors the tangent shape of the
/// state block of the same kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionNoise {
    layout: StateLayout,
}

impl PredictionNoise {
    pub fn new(n_cam: usize, n_max: usize) -> Self {
        Self {
            layout: StateLayout::kinematic_blocks(n_cam, n_max).resolve(),
        }
    }

    /// Noise layout matching an existing state layout.
    pub fn for_state(state_layout: &StateLayout) -> Self {
        Self::new(
            state_layout.count(BlockKind::ExtrinsicTranslation),
            state_layout.count(BlockKind::Depth),
        )
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub fn dimension(&self) -> usize {
        self.layout.dimension()
    }

    /// Diagonal process-noise covariance for a step of `dt` seconds.
    pub fn covariance(&self, config: &ProcessNoiseConfig, dt: f64) -> DMatrix<f64> {
        let mut cov = DMatrix::zeros(self.dimension(), self.dimension());
        for block in self.layout.blocks() {
            let variance = config.variance(block.kind) * dt;
            for i in block.offset..block.offset + block.dim() {
                cov[(i, i)] = variance;
            }
        }
        cov
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_tracks_state_blocks() {
        let state_layout = StateLayout::filter(2, 5);
        let noise = PredictionNoise::for_state(&state_layout);

        assert_eq!(noise.dimension(), state_layout.dimension());
        for block in state_layout.blocks() {
            let noise_block = noise.layout().block(block.kind).unwrap();
            assert_eq!(noise_block.dim(), block.dim());
            assert_eq!(noise_block.offset, block.offset);
        }
    }

    #[test]
    fn test_covariance_scales_with_dt() {
        let noise = PredictionNoise::new(1, 1);
        let config = ProcessNoiseConfig::default();
        let cov = noise.covariance(&config, 0.005);

        let dep = noise.layout().offset(BlockKind::Depth, 0).unwrap();
        let att = noise.layout().offset(BlockKind::Attitude, 0).unwrap();
        assert_eq!(cov[(dep, dep)], config.dep * 0.005);
        assert_eq!(cov[(att + 2, att + 2)], config.att * 0.005);
        assert_eq!(cov[(0, 1)], 0.0);
    }

    #[test]
    fn test_input_from_imu_sample() {
        let sample = ImuSample {
            timestamp_s: 1.5,
            accel: Vector3::new(0.0, 0.0, 9.81),
            gyro: Vector3::new(0.01, 0.0, -0.02),
        };
        let input = PredictionInput::from(&sample);
        assert_eq!(input.acceleration, sample.accel);
        assert_eq!(input.angular_velocity, sample.gyro);
    }
}
