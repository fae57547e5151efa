//! `racer-hal` – Hardware Abstraction Layer
//!
//! The control loop never talks to a device directly.  Every sensor and the
//! drive actuator sit behind a trait so real drivers and simulated stubs are
//! interchangeable.
//!
//! # Modules
//!
//! - [`camera`] – [`Camera`][camera::Camera]: blocking image-sensor reader.
//! - [`motion`] – [`MotionSensor`][motion::MotionSensor]: 9-axis inertial
//!   sensor (accelerometer, gyroscope, magnetometer).
//! - [`health`] – [`HealthSource`][health::HealthSource]: named numeric
//!   system-health metrics (temperatures, power, utilisation).
//! - [`actuator`] – [`Actuator`][actuator::Actuator]: throttle/steering
//!   output with a guaranteed neutral stop command.
//! - [`rig`] – [`Rig`][rig::Rig] and [`RigBuilder`][rig::RigBuilder]:
//!   all-or-nothing acquisition of one of each driver.
//! - [`sim`] – in-process simulated drivers for tests and bench runs.

pub mod actuator;
pub mod camera;
pub mod health;
pub mod motion;
pub mod rig;
pub mod sim;

pub use actuator::Actuator;
pub use camera::Camera;
pub use health::{DEFAULT_HEALTH_KEYS, HealthSource, select_metrics};
pub use motion::MotionSensor;
pub use rig::{Rig, RigBuilder};
