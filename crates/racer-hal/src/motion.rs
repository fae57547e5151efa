//! Generic `MotionSensor` trait for 9-axis inertial units (MPU-9250 class).

use racer_types::{InertialSample, RacerError};

/// An accelerometer + gyroscope + magnetometer package.
///
/// Each read returns one `[x, y, z]` triple.  The loop reads all three axes
/// groups once per iteration via [`MotionSensor::read_sample`].
pub trait MotionSensor: Send + Sync {
    /// Stable identifier, e.g. `"mpu9250"`.
    fn id(&self) -> &str;

    /// Apply register configuration and confirm the device answers.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::FatalInit`] when the device is not on the bus.
    fn probe(&mut self) -> Result<(), RacerError> {
        Ok(())
    }

    fn read_acceleration(&mut self) -> Result<[f64; 3], RacerError>;

    fn read_angular_rate(&mut self) -> Result<[f64; 3], RacerError>;

    fn read_magnetic_field(&mut self) -> Result<[f64; 3], RacerError>;

    /// Read all nine axes.  Fails on the first axis group that fails.
    fn read_sample(&mut self) -> Result<InertialSample, RacerError> {
        Ok(InertialSample {
            acceleration: self.read_acceleration()?,
            angular_rate: self.read_angular_rate()?,
            magnetic_field: self.read_magnetic_field()?,
        })
    }
}
