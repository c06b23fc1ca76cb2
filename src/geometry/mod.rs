//! Geometry primitives: SO(3) helpers, bearing vectors, camera extrinsics.

pub mod bearing;
pub mod extrinsics;
pub mod so3;

pub use bearing::BearingVector;
pub use extrinsics::CameraExtrinsics;
