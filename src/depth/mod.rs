//! Depth parameterization of tracked features.

pub mod parameterization;

pub use parameterization::{DepthEncoding, DepthMap, DepthValues, INVERSE_DEPTH_EPSILON};
