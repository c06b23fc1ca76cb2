//! Filter configuration loaded from YAML.
//!
//! ```yaml
//! max_features: 25
//! num_cameras: 1
//! depth_type: 1            # 0 direct, 1 inverse, 2 log, 3 hyperbolic (or the name)
//! extrinsics_mode: estimated
//! use_prediction_merge: true
//! camera_extrinsics:
//!   - translation: [0.0, 0.0, 0.0]
//!     rotation: [1.0, 0.0, 0.0, 0.0]   # w, x, y, z; body to camera
//! initial_covariance: { pos: 1.0e-4, att: 0.1 }
//! process_noise: { dep: 1.0e-4 }
//! feature_init: { depth_parameter: 0.5, depth_variance: 1.0, bearing_variance: 1.0e-4 }
//! ```

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use nalgebra::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use serde::Deserialize;

use crate::depth::DepthEncoding;
use crate::error::{Result, StateError};
use crate::geometry::CameraExtrinsics;
use crate::state::{BlockKind, ExtrinsicsMode, ProcessNoiseConfig};

/// Body-to-camera transform as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CameraExtrinsicsConfig {
    pub translation: [f64; 3],
    /// Quaternion `[w, x, y, z]`.
    pub rotation: [f64; 4],
}

impl CameraExtrinsicsConfig {
    pub fn to_extrinsics(&self) -> Result<CameraExtrinsics> {
        let [w, x, y, z] = self.rotation;
        let q = Quaternion::new(w, x, y, z);
        if !(q.norm() > 1e-9) {
            return Err(StateError::InvalidConfig(format!(
                "camera rotation {:?} is not a valid quaternion",
                self.rotation
            )));
        }
        Ok(CameraExtrinsics {
            translation: Vector3::from(self.translation),
            rotation: UnitQuaternion::from_quaternion(q),
        })
    }
}

/// Initial variances written on the covariance diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InitialCovarianceConfig {
    pub pos: f64,
    pub vel: f64,
    pub acb: f64,
    pub gyb: f64,
    pub att: f64,
    pub vep: f64,
    pub vea: f64,
}

impl Default for InitialCovarianceConfig {
    fn default() -> Self {
        Self {
            pos: 1e-4,
            vel: 1.0,
            acb: 4e-4,
            gyb: 3e-4,
            att: 0.1,
            vep: 1e-4,
            vea: 7.6e-5,
        }
    }
}

impl InitialCovarianceConfig {
    /// Variance for a block; feature blocks start at identity.
    pub fn variance(&self, kind: BlockKind) -> f64 {
        match kind {
            BlockKind::Position => self.pos,
            BlockKind::Velocity => self.vel,
            BlockKind::AccelBias => self.acb,
            BlockKind::GyroBias => self.gyb,
            BlockKind::Attitude => self.att,
            BlockKind::ExtrinsicTranslation => self.vep,
            BlockKind::ExtrinsicRotation => self.vea,
            BlockKind::Depth | BlockKind::Bearing => 1.0,
        }
    }

    fn values(&self) -> [(&'static str, f64); 7] {
        [
            ("pos", self.pos),
            ("vel", self.vel),
            ("acb", self.acb),
            ("gyb", self.gyb),
            ("att", self.att),
            ("vep", self.vep),
            ("vea", self.vea),
        ]
    }
}

/// Defaults used when a new feature enters the state.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeatureInitConfig {
    pub depth_parameter: f64,
    pub depth_variance: f64,
    pub bearing_variance: f64,
}

impl Default for FeatureInitConfig {
    fn default() -> Self {
        Self {
            depth_parameter: 0.5,
            depth_variance: 1.0,
            bearing_variance: 1e-4,
        }
    }
}

impl FeatureInitConfig {
    /// 3x3 covariance ordered `[depth, bearing_1, bearing_2]`.
    pub fn covariance(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&Vector3::new(
            self.depth_variance,
            self.bearing_variance,
            self.bearing_variance,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_features: usize,
    pub num_cameras: usize,
    pub depth_type: DepthEncoding,
    pub extrinsics_mode: ExtrinsicsMode,
    pub use_prediction_merge: bool,
    pub camera_extrinsics: Vec<CameraExtrinsicsConfig>,
    pub initial_covariance: InitialCovarianceConfig,
    pub process_noise: ProcessNoiseConfig,
    pub feature_init: FeatureInitConfig,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_features: 25,
            num_cameras: 1,
            depth_type: DepthEncoding::Inverse,
            extrinsics_mode: ExtrinsicsMode::Estimated,
            use_prediction_merge: true,
            camera_extrinsics: Vec::new(),
            initial_covariance: InitialCovarianceConfig::default(),
            process_noise: ProcessNoiseConfig::default(),
            feature_init: FeatureInitConfig::default(),
        }
    }
}

impl FilterConfig {
    pub fn from_yaml_str(text: &str) -> AnyResult<Self> {
        let config: FilterConfig =
            serde_yaml::from_str(text).context("Failed to parse filter configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> AnyResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config: FilterConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse filter configuration {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_cameras == 0 {
            return Err(StateError::InvalidConfig("num_cameras must be at least 1".into()));
        }
        if !self.camera_extrinsics.is_empty() && self.camera_extrinsics.len() != self.num_cameras {
            return Err(StateError::InvalidConfig(format!(
                "{} camera extrinsics given for {} cameras",
                self.camera_extrinsics.len(),
                self.num_cameras
            )));
        }
        for ext in &self.camera_extrinsics {
            ext.to_extrinsics()?;
        }
        for (name, value) in self.initial_covariance.values() {
            if !(value > 0.0) {
                return Err(StateError::InvalidConfig(format!(
                    "initial_covariance.{name} must be positive, got {value}"
                )));
            }
        }
        let init = &self.feature_init;
        if !(init.depth_variance > 0.0 && init.bearing_variance > 0.0) {
            return Err(StateError::InvalidConfig(
                "feature_init variances must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Extrinsics per camera, identity where none are configured.
    pub fn extrinsics(&self) -> Result<Vec<CameraExtrinsics>> {
        if self.camera_extrinsics.is_empty() {
            return Ok(vec![CameraExtrinsics::identity(); self.num_cameras]);
        }
        self.camera_extrinsics
            .iter()
            .map(CameraExtrinsicsConfig::to_extrinsics)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    const SAMPLE: &str = r#"
max_features: 4
num_cameras: 2
depth_type: hyperbolic
extrinsics_mode: fixed
use_prediction_merge: false
camera_extrinsics:
  - translation: [0.1, 0.0, 0.0]
    rotation: [1.0, 0.0, 0.0, 0.0]
  - translation: [-0.1, 0.0, 0.0]
    rotation: [0.0, 0.0, 0.0, 2.0]
initial_covariance:
  att: 0.05
feature_init:
  depth_parameter: 0.25
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = FilterConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.max_features, 4);
        assert_eq!(config.depth_type, DepthEncoding::Hyperbolic);
        assert_eq!(config.extrinsics_mode, ExtrinsicsMode::Fixed);
        assert!(!config.use_prediction_merge);
        assert_eq!(config.initial_covariance.att, 0.05);
        assert_eq!(config.initial_covariance.pos, InitialCovarianceConfig::default().pos);
        assert_eq!(config.feature_init.depth_parameter, 0.25);

        let extrinsics = config.extrinsics().unwrap();
        assert_eq!(extrinsics.len(), 2);
        // Non-unit quaternions are normalized.
        assert_relative_eq!(extrinsics[1].rotation.quaternion().norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(extrinsics[1].rotation.w.abs(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FilterConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.depth_type, DepthEncoding::Inverse);
        assert_eq!(config.extrinsics_mode, ExtrinsicsMode::Estimated);
        assert!(config.use_prediction_merge);
        assert_eq!(config.extrinsics().unwrap(), vec![CameraExtrinsics::identity()]);
    }

    #[test]
    fn test_invalid_depth_type_fails() {
        let err = FilterConfig::from_yaml_str("depth_type: 4").unwrap_err();
        assert!(format!("{err:#}").contains("invalid depth parameterization selector"));
    }

    #[test]
    fn test_extrinsics_count_mismatch() {
        let text = "num_cameras: 2\ncamera_extrinsics:\n  - translation: [0, 0, 0]\n    rotation: [1, 0, 0, 0]\n";
        let err = FilterConfig::from_yaml_str(text).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StateError>(),
            Some(StateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_non_positive_variance_rejected() {
        let config = FilterConfig {
            initial_covariance: InitialCovarianceConfig {
                vel: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = FilterConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.num_cameras, 2);

        assert!(FilterConfig::from_yaml_file("/nonexistent/filter.yaml").is_err());
    }
}
