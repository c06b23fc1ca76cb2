pub mod config;
pub mod depth;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod imu;
pub mod io;
pub mod state;

pub use config::FilterConfig;
pub use depth::{DepthEncoding, DepthMap};
pub use error::{Result, StateError};
pub use filter::{FilterSnapshot, FilterState, SharedFilterState};
pub use state::{EstimatorState, ExtrinsicsMode, PredictionInput, PredictionNoise, StateLayout};
