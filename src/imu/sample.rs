use nalgebra::Vector3;

/// Magnitude of gravity (m/s^2).
pub const GRAVITY_MAGNITUDE: f64 = 9.81;

/// Single IMU measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub timestamp_s: f64,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}
