//! In-process simulated drivers for tests and bench runs without a car.
//!
//! [`SimRig`] wires a [`SimCamera`], [`SimImu`], [`SimHealth`] and
//! [`SimActuator`] into a [`RigBuilder`] so the full drive loop can run
//! headless.  The simulated camera paints a bright vertical track stripe whose
//! column can drift between frames, which gives lane models something real to
//! follow.
//!
//! # Example
//!
//! ```rust
//! use racer_hal::sim::SimRig;
//!
//! let sim = SimRig::new(224).with_lane_offset(0.25);
//! let log = sim.command_log();
//! let rig = sim.into_builder().build().expect("sim rig must build");
//! assert_eq!(rig.camera.id(), "sim_camera");
//! assert!(log.commands().is_empty());
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use racer_types::{ActuationCommand, Frame, RacerError};

use crate::actuator::Actuator;
use crate::camera::Camera;
use crate::health::HealthSource;
use crate::motion::MotionSensor;
use crate::rig::RigBuilder;

const BACKGROUND: u8 = 30;
const STRIPE: u8 = 250;

// ────────────────────────────────────────────────────────────────────────────
// Command log
// ────────────────────────────────────────────────────────────────────────────

/// Shared record of every command a [`SimActuator`] received.  Cloning the
/// log shares the underlying buffer, so tests can keep a handle after the
/// actuator has been moved into a rig.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<ActuationCommand>>>);

impl CommandLog {
    pub fn commands(&self) -> Vec<ActuationCommand> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self) -> Option<ActuationCommand> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).last().copied()
    }

    fn push(&self, cmd: ActuationCommand) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(cmd);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub actuator
// ────────────────────────────────────────────────────────────────────────────

/// A simulated actuator that records every command it accepts.
pub struct SimActuator {
    id: String,
    last: ActuationCommand,
    log: CommandLog,
    accepted: u64,
    fail_after: Option<u64>,
}

impl SimActuator {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            last: ActuationCommand::NEUTRAL,
            log: CommandLog::default(),
            accepted: 0,
            fail_after: None,
        })
    }

    /// Reject every driving command after the first `n`.  The neutral stop
    /// is always accepted.
    pub fn failing_after(mut self: Box<Self>, n: u64) -> Box<Self> {
        self.fail_after = Some(n);
        self
    }

    /// Handle to this actuator's command history.
    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }
}

impl Actuator for SimActuator {
    fn id(&self) -> &str {
        &self.id
    }

    fn set(&mut self, cmd: ActuationCommand) -> Result<(), RacerError> {
        if !cmd.is_neutral() {
            if self.fail_after.is_some_and(|n| self.accepted >= n) {
                return Err(RacerError::sensor(&self.id, "servo bus write timed out"));
            }
            self.accepted += 1;
        }
        self.last = cmd;
        self.log.push(cmd);
        Ok(())
    }

    fn last_command(&self) -> ActuationCommand {
        self.last
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub camera
// ────────────────────────────────────────────────────────────────────────────

/// A simulated camera producing square frames with a bright vertical stripe
/// marking the track centre.
pub struct SimCamera {
    id: String,
    resolution: u32,
    /// Stripe column in normalised `[-1, 1]` coordinates.
    lane_x: f64,
    /// Added to `lane_x` after every read; reverses at ±0.9.
    drift: f64,
    reads: u64,
    fail_after: Option<u64>,
    available: bool,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, resolution: u32) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            resolution,
            lane_x: 0.0,
            drift: 0.0,
            reads: 0,
            fail_after: None,
            available: true,
        })
    }

    /// Place the stripe at normalised column `x`.
    pub fn with_lane_offset(mut self: Box<Self>, x: f64) -> Box<Self> {
        self.lane_x = x.clamp(-1.0, 1.0);
        self
    }

    /// Move the stripe by `step` per frame.
    pub fn with_drift(mut self: Box<Self>, step: f64) -> Box<Self> {
        self.drift = step;
        self
    }

    /// Return [`RacerError::SensorFailure`] once `n` frames have been read.
    pub fn failing_after(mut self: Box<Self>, n: u64) -> Box<Self> {
        self.fail_after = Some(n);
        self
    }

    /// Make [`Camera::probe`] fail, as if the device were not connected.
    pub fn unavailable(mut self: Box<Self>) -> Box<Self> {
        self.available = false;
        self
    }

    fn render(&self) -> Frame {
        let side = self.resolution;
        let mut frame = Frame {
            width: side,
            height: side,
            data: vec![BACKGROUND; side as usize * side as usize * 3],
        };
        let half_width = (side / 32).max(1) as i64;
        let (centre, _) = racer_types::LaneEstimate::new(self.lane_x, 0.0).to_pixel(side);
        let centre = i64::from(centre.min(side.saturating_sub(1)));
        let lo = (centre - half_width).max(0) as usize;
        let hi = (centre + half_width).min(i64::from(side) - 1) as usize;
        for row in 0..side as usize {
            for col in lo..=hi {
                let idx = (row * side as usize + col) * 3;
                frame.data[idx..idx + 3].fill(STRIPE);
            }
        }
        frame
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn probe(&mut self) -> Result<(), RacerError> {
        if self.available {
            Ok(())
        } else {
            Err(RacerError::init(&self.id, "camera not connected"))
        }
    }

    fn read(&mut self) -> Result<Frame, RacerError> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(RacerError::sensor(&self.id, "frame buffer unavailable"));
        }
        let frame = self.render();
        self.reads += 1;
        self.lane_x += self.drift;
        if self.lane_x.abs() > 0.9 {
            self.drift = -self.drift;
            self.lane_x = self.lane_x.clamp(-0.9, 0.9);
        }
        Ok(frame)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub IMU
// ────────────────────────────────────────────────────────────────────────────

/// A simulated 9-axis IMU: constant gravity, a slow deterministic yaw wobble
/// and a fixed magnetic field.
pub struct SimImu {
    id: String,
    reads: u64,
    fail_after: Option<u64>,
}

impl SimImu {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            reads: 0,
            fail_after: None,
        })
    }

    /// Fail the accelerometer read once `n` samples have been taken.
    pub fn failing_after(mut self: Box<Self>, n: u64) -> Box<Self> {
        self.fail_after = Some(n);
        self
    }
}

impl MotionSensor for SimImu {
    fn id(&self) -> &str {
        &self.id
    }

    fn read_acceleration(&mut self) -> Result<[f64; 3], RacerError> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(RacerError::sensor(&self.id, "i2c read timed out"));
        }
        self.reads += 1;
        Ok([0.0, 0.0, 9.81])
    }

    fn read_angular_rate(&mut self) -> Result<[f64; 3], RacerError> {
        let t = self.reads as f64 * 0.3;
        Ok([0.0, 0.0, 0.05 * t.sin()])
    }

    fn read_magnetic_field(&mut self) -> Result<[f64; 3], RacerError> {
        Ok([22.0, -5.0, 40.0])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stub health source
// ────────────────────────────────────────────────────────────────────────────

/// A simulated stats daemon reporting fixed values.
pub struct SimHealth {
    id: String,
    reads: u64,
    fail_after: Option<u64>,
}

impl SimHealth {
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            reads: 0,
            fail_after: None,
        })
    }

    /// Fail every read after the first `n`.
    pub fn failing_after(mut self: Box<Self>, n: u64) -> Box<Self> {
        self.fail_after = Some(n);
        self
    }
}

impl HealthSource for SimHealth {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&mut self) -> Result<BTreeMap<String, f64>, RacerError> {
        if self.fail_after.is_some_and(|n| self.reads >= n) {
            return Err(RacerError::sensor(&self.id, "stats service stopped responding"));
        }
        self.reads += 1;
        Ok(BTreeMap::from([
            ("gpu_util".to_string(), 37.0),
            ("gpu_temp".to_string(), 41.5),
            ("cpu_temp".to_string(), 43.0),
            ("power_avg".to_string(), 4100.0),
            ("power_cur".to_string(), 4350.0),
            ("fan_rpm".to_string(), 0.0),
        ]))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a fully simulated [`RigBuilder`].
pub struct SimRig {
    camera: Box<SimCamera>,
    imu: Box<SimImu>,
    health: Box<SimHealth>,
    actuator: Box<SimActuator>,
}

impl SimRig {
    /// Simulated rig whose camera produces `resolution`×`resolution` frames.
    pub fn new(resolution: u32) -> Self {
        Self {
            camera: SimCamera::new("sim_camera", resolution),
            imu: SimImu::new("sim_imu"),
            health: SimHealth::new("sim_health"),
            actuator: SimActuator::new("sim_racecar"),
        }
    }

    pub fn with_lane_offset(mut self, x: f64) -> Self {
        self.camera = self.camera.with_lane_offset(x);
        self
    }

    pub fn with_drift(mut self, step: f64) -> Self {
        self.camera = self.camera.with_drift(step);
        self
    }

    pub fn camera_failing_after(mut self, n: u64) -> Self {
        self.camera = self.camera.failing_after(n);
        self
    }

    pub fn imu_failing_after(mut self, n: u64) -> Self {
        self.imu = self.imu.failing_after(n);
        self
    }

    pub fn health_failing_after(mut self, n: u64) -> Self {
        self.health = self.health.failing_after(n);
        self
    }

    pub fn actuator_failing_after(mut self, n: u64) -> Self {
        self.actuator = self.actuator.failing_after(n);
        self
    }

    /// Handle to the simulated actuator's command history.
    pub fn command_log(&self) -> CommandLog {
        self.actuator.log()
    }

    /// Consume the builder and return a [`RigBuilder`] with all four
    /// simulated drivers registered.
    pub fn into_builder(self) -> RigBuilder {
        RigBuilder::new()
            .with_camera(self.camera)
            .with_motion_sensor(self.imu)
            .with_health(self.health)
            .with_actuator(self.actuator)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_actuator_records_commands() {
        let mut act = SimActuator::new("car");
        let log = act.log();
        act.set(ActuationCommand::new(-0.005, 0.2)).unwrap();
        act.stop().unwrap();
        assert_eq!(
            log.commands(),
            vec![ActuationCommand::new(-0.005, 0.2), ActuationCommand::NEUTRAL]
        );
        assert!(act.last_command().is_neutral());
    }

    #[test]
    fn failing_actuator_still_accepts_stop() {
        let mut act = SimActuator::new("car").failing_after(1);
        let log = act.log();
        act.set(ActuationCommand::new(-0.005, 0.1)).unwrap();
        let err = act.set(ActuationCommand::new(-0.005, 0.2)).unwrap_err();
        assert!(matches!(err, RacerError::SensorFailure { ref component, .. } if component == "car"));
        act.stop().unwrap();
        assert_eq!(
            log.commands(),
            vec![ActuationCommand::new(-0.005, 0.1), ActuationCommand::NEUTRAL]
        );
    }

    #[test]
    fn failing_health_source_errors_after_n_reads() {
        let mut health = SimHealth::new("jtop").failing_after(2);
        assert!(health.read().is_ok());
        assert!(health.read().is_ok());
        assert!(matches!(health.read(), Err(RacerError::SensorFailure { .. })));
    }

    #[test]
    fn sim_camera_paints_stripe_at_lane_offset() {
        let mut cam = SimCamera::new("cam", 64).with_lane_offset(0.5);
        let frame = cam.read().unwrap();
        assert!(frame.is_well_formed());
        // 0.5 → column 48 of 64.
        assert_eq!(frame.pixel(48, 10), Some([STRIPE; 3]));
        assert_eq!(frame.pixel(5, 10), Some([BACKGROUND; 3]));
    }

    #[test]
    fn sim_camera_stripe_stays_in_bounds_at_right_edge() {
        let mut cam = SimCamera::new("cam", 32).with_lane_offset(1.0);
        let frame = cam.read().unwrap();
        assert_eq!(frame.pixel(31, 0), Some([STRIPE; 3]));
    }

    #[test]
    fn sim_camera_drift_reverses_at_limits() {
        let mut cam = SimCamera::new("cam", 16).with_lane_offset(0.8).with_drift(0.2);
        cam.read().unwrap(); // 0.8 → 1.0, clamps to 0.9 and reverses
        assert!((cam.lane_x - 0.9).abs() < 1e-9);
        cam.read().unwrap();
        assert!((cam.lane_x - 0.7).abs() < 1e-9);
    }

    #[test]
    fn sim_camera_fails_after_limit() {
        let mut cam = SimCamera::new("cam", 8).failing_after(2);
        assert!(cam.read().is_ok());
        assert!(cam.read().is_ok());
        assert!(matches!(cam.read(), Err(RacerError::SensorFailure { .. })));
    }

    #[test]
    fn unavailable_camera_fails_probe() {
        let mut cam = SimCamera::new("cam", 8).unavailable();
        assert!(matches!(cam.probe(), Err(RacerError::FatalInit { .. })));
    }

    #[test]
    fn sim_imu_reports_gravity() {
        let mut imu = SimImu::new("imu");
        let sample = imu.read_sample().unwrap();
        assert_eq!(sample.acceleration, [0.0, 0.0, 9.81]);
        assert_eq!(sample.magnetic_field, [22.0, -5.0, 40.0]);
    }

    #[test]
    fn sim_health_reports_default_keys() {
        let mut health = SimHealth::new("jtop");
        let stats = health.read().unwrap();
        for key in crate::health::DEFAULT_HEALTH_KEYS {
            assert!(stats.contains_key(*key), "missing {key}");
        }
    }

    #[test]
    fn sim_rig_builds_without_hardware() {
        let sim = SimRig::new(32);
        let log = sim.command_log();
        let mut rig = sim.into_builder().build().expect("sim rig must build");
        rig.actuator.set(ActuationCommand::new(-0.1, 0.0)).unwrap();
        assert_eq!(log.last(), Some(ActuationCommand::new(-0.1, 0.0)));
        assert_eq!(rig.camera.read().unwrap().width, 32);
    }
}
