pub mod sample;

pub use sample::{GRAVITY_MAGNITUDE, ImuSample};
