//! [`Rig`] – the complete set of drivers owned by one drive run.
//!
//! A rig holds exactly one [`Camera`], one [`MotionSensor`], one
//! [`HealthSource`] and one [`Actuator`].  It is only ever produced by
//! [`RigBuilder::build`], which probes every driver and refuses to hand out a
//! partial rig: the actuator is never live without its sensors, or vice
//! versa.

use racer_types::RacerError;
use tracing::{debug, info};

use crate::actuator::Actuator;
use crate::camera::Camera;
use crate::health::HealthSource;
use crate::motion::MotionSensor;

/// Fully acquired driver set.  Fields are public so the drive loop can split
/// the actuator off into its shutdown guard.
pub struct Rig {
    pub camera: Box<dyn Camera>,
    pub motion: Box<dyn MotionSensor>,
    pub health: Box<dyn HealthSource>,
    pub actuator: Box<dyn Actuator>,
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig")
            .field("camera", &self.camera.id())
            .field("motion", &self.motion.id())
            .field("health", &self.health.id())
            .field("actuator", &self.actuator.id())
            .finish()
    }
}

/// All-or-nothing builder for [`Rig`].
///
/// Register each driver with a `with_*` method, then call
/// [`build`][Self::build].
#[derive(Default)]
pub struct RigBuilder {
    camera: Option<Box<dyn Camera>>,
    motion: Option<Box<dyn MotionSensor>>,
    health: Option<Box<dyn HealthSource>>,
    actuator: Option<Box<dyn Actuator>>,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the camera.  Replaces any previously registered camera.
    pub fn with_camera(mut self, camera: Box<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Register the motion sensor.  Replaces any previous one.
    pub fn with_motion_sensor(mut self, motion: Box<dyn MotionSensor>) -> Self {
        self.motion = Some(motion);
        self
    }

    /// Register the system-health source.  Replaces any previous one.
    pub fn with_health(mut self, health: Box<dyn HealthSource>) -> Self {
        self.health = Some(health);
        self
    }

    /// Register the drive actuator.  Replaces any previous one.
    pub fn with_actuator(mut self, actuator: Box<dyn Actuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    /// Probe every driver and return the assembled [`Rig`].
    ///
    /// Sensors are probed before the actuator so that a missing sensor aborts
    /// acquisition before the actuator is ever touched.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::FatalInit`] naming the first component that is
    /// missing or fails its probe.
    pub fn build(self) -> Result<Rig, RacerError> {
        let mut camera = self
            .camera
            .ok_or_else(|| RacerError::init("camera", "no camera registered"))?;
        let mut motion = self
            .motion
            .ok_or_else(|| RacerError::init("motion_sensor", "no motion sensor registered"))?;
        let mut health = self
            .health
            .ok_or_else(|| RacerError::init("health", "no health source registered"))?;
        let mut actuator = self
            .actuator
            .ok_or_else(|| RacerError::init("actuator", "no actuator registered"))?;

        probe("camera", camera.id().to_string(), || camera.probe())?;
        probe("motion_sensor", motion.id().to_string(), || motion.probe())?;
        probe("health", health.id().to_string(), || health.probe())?;
        probe("actuator", actuator.id().to_string(), || actuator.probe())?;

        info!(
            camera = camera.id(),
            motion = motion.id(),
            health = health.id(),
            actuator = actuator.id(),
            "rig acquired"
        );

        Ok(Rig {
            camera,
            motion,
            health,
            actuator,
        })
    }
}

// Run one driver probe.  Any failure becomes FatalInit naming `role:id`.
fn probe(
    role: &str,
    id: String,
    f: impl FnOnce() -> Result<(), RacerError>,
) -> Result<(), RacerError> {
    debug!(role, id = %id, "probing driver");
    f().map_err(|e| {
        let details = match e {
            RacerError::FatalInit { details, .. } => details,
            other => other.to_string(),
        };
        RacerError::init(format!("{role}:{id}"), details)
    })
}
