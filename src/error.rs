//! Error type shared by the filter-state modules.

use thiserror::Error;

/// Errors raised by configuration, indexing and covariance bookkeeping.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// Depth encoding selector is not one of the known encodings.
    #[error("invalid depth parameterization selector: {0}")]
    InvalidDepthEncoding(String),
    /// Physical depth cannot be represented by the selected encoding.
    #[error("depth {depth} is not representable with the {encoding} encoding")]
    InvalidDepth { depth: f64, encoding: &'static str },
    /// Feature slot index is beyond the fixed capacity.
    #[error("feature slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },
    /// Camera index is beyond the number of configured cameras.
    #[error("camera {camera} out of range ({num_cameras} cameras)")]
    CameraOutOfRange { camera: usize, num_cameras: usize },
    /// A vector or matrix does not match the layout dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Bearing vector has (near) zero length and no direction.
    #[error("bearing vector has no direction (norm {0})")]
    DegenerateBearing(f64),
    /// Caller supplied covariance block is not a valid covariance.
    #[error("invalid covariance: {0}")]
    InvalidCovariance(String),
    /// The filter covariance violates a structural invariant.
    #[error("covariance inconsistent at feature slot {slot}: {reason}")]
    CovarianceInconsistent { slot: usize, reason: String },
    /// Configuration values are inconsistent with each other.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StateError>;
