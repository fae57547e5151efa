//! Lane estimate → actuation command.
//!
//! A proportional mapping with no clamping, smoothing or rate limiting.  The
//! vertical component of the estimate and any detections are ignored.

use racer_types::{ActuationCommand, LaneEstimate};

use crate::config::DriveConfig;

/// Gains captured from a [`DriveConfig`] at loop start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPolicy {
    throttle: f64,
    throttle_gain: f64,
    steering_gain: f64,
}

impl ControlPolicy {
    pub fn from_config(cfg: &DriveConfig) -> Self {
        Self {
            throttle: cfg.throttle,
            throttle_gain: cfg.throttle_gain,
            steering_gain: cfg.steering_gain,
        }
    }

    /// `steering = x * steering_gain`, `throttle = throttle * throttle_gain`.
    pub fn apply(&self, lane: &LaneEstimate) -> ActuationCommand {
        ActuationCommand::new(self.throttle * self.throttle_gain, lane.x * self.steering_gain)
    }
}

/// One-shot form of [`ControlPolicy::apply`].
pub fn policy(lane: &LaneEstimate, cfg: &DriveConfig) -> ActuationCommand {
    ControlPolicy::from_config(cfg).apply(lane)
}
