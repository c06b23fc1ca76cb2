//! Estimator state: block layout, mean state, auxiliary data, prediction input.

pub mod auxiliary;
pub mod estimator_state;
pub mod layout;
pub mod prediction;

pub use auxiliary::{ExtrinsicsMode, FeatureScratch, StateAuxiliary};
pub use estimator_state::{EstimatorState, ExtrinsicsReading, NEUTRAL_DEPTH_PARAMETER};
pub use layout::{BlockKind, BlockSpec, LayoutBuilder, StateLayout};
pub use prediction::{PredictionInput, PredictionNoise, ProcessNoiseConfig};
