//! [`DriveConfig`] – the immutable per-run configuration record.
//!
//! Built by the caller (the CLI merges file, environment and flags), checked
//! once with [`DriveConfig::validate`], then handed to the drive loop, which
//! never mutates it.

use std::path::PathBuf;

use racer_perception::DetectionThresholds;
use racer_types::RacerError;
use serde::{Deserialize, Serialize};

/// Where the lane model weights come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// A versioned artifact resolved by the caller, e.g. `trt-model:latest`.
    Remote { name: String, version: String },
    /// A model file on local disk.
    Local(PathBuf),
}

impl Default for ModelSource {
    fn default() -> Self {
        ModelSource::Remote {
            name: "trt-model".to_string(),
            version: "latest".to_string(),
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Remote { name, version } => write!(f, "{name}:{version}"),
            ModelSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Nominal frame rate in Hz.  Advisory: used for the debug-session frame
    /// budget and stage budgets, never for pacing.
    pub framerate: u32,
    /// Base throttle set-point, `0` (stop) to `1` (full speed).
    pub throttle: f64,
    /// Sign/scale applied to `throttle`.
    pub throttle_gain: f64,
    /// Scale applied to the horizontal lane offset.  More negative means more
    /// aggressive correction.
    pub steering_gain: f64,
    pub debug: bool,
    /// Length of a debug session in seconds.
    pub debug_seconds: u32,
    /// Frames between captured annotated images.
    pub debug_freq: u32,
    /// Run the secondary object detector and overlay its boxes.
    pub detect_objects: bool,
    /// Frame side in pixels.
    pub resolution: u32,
    /// Radius of the lane marker drawn on annotated frames.
    pub marker_radius: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub model: ModelSource,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            framerate: 10,
            throttle: 0.005,
            throttle_gain: -1.0,
            steering_gain: -2.0,
            debug: false,
            debug_seconds: 120,
            debug_freq: 10,
            detect_objects: false,
            resolution: 224,
            marker_radius: 5,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            model: ModelSource::default(),
        }
    }
}

impl DriveConfig {
    /// Reject records the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), RacerError> {
        let fail = |msg: String| Err(RacerError::Config(msg));
        if self.framerate == 0 {
            return fail("framerate must be positive".to_string());
        }
        if self.resolution == 0 {
            return fail("resolution must be positive".to_string());
        }
        if self.debug_freq == 0 {
            return fail("debug_freq must be positive".to_string());
        }
        if self.debug && self.debug_seconds == 0 {
            return fail("debug_seconds must be positive in debug mode".to_string());
        }
        for (name, v) in [
            ("throttle", self.throttle),
            ("throttle_gain", self.throttle_gain),
            ("steering_gain", self.steering_gain),
        ] {
            if !v.is_finite() {
                return fail(format!("{name} must be finite, got {v}"));
            }
        }
        for (name, v) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return fail(format!("{name} must be within [0, 1], got {v}"));
            }
        }
        Ok(())
    }

    /// Number of frames in a debug session: `framerate * debug_seconds`.
    pub fn debug_frame_budget(&self) -> u64 {
        u64::from(self.framerate) * u64::from(self.debug_seconds)
    }

    pub fn thresholds(&self) -> DetectionThresholds {
        DetectionThresholds {
            confidence: self.confidence_threshold,
            iou: self.iou_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = DriveConfig::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.throttle_gain - -1.0).abs() < f64::EPSILON);
        assert!((cfg.steering_gain - -2.0).abs() < f64::EPSILON);
        assert_eq!(cfg.resolution, 224);
    }

    #[test]
    fn zero_framerate_is_rejected() {
        let cfg = DriveConfig {
            framerate: 0,
            ..DriveConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(RacerError::Config(_))));
    }

    #[test]
    fn zero_debug_seconds_only_matters_in_debug_mode() {
        let mut cfg = DriveConfig {
            debug_seconds: 0,
            ..DriveConfig::default()
        };
        assert!(cfg.validate().is_ok());
        cfg.debug = true;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_finite_gain_is_rejected() {
        let cfg = DriveConfig {
            steering_gain: f64::NAN,
            ..DriveConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("steering_gain"));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let cfg = DriveConfig {
            iou_threshold: 1.5,
            ..DriveConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_frame_budget_multiplies() {
        let cfg = DriveConfig {
            framerate: 10,
            debug_seconds: 2,
            ..DriveConfig::default()
        };
        assert_eq!(cfg.debug_frame_budget(), 20);
    }

    #[test]
    fn model_source_display() {
        assert_eq!(ModelSource::default().to_string(), "trt-model:latest");
        assert_eq!(
            ModelSource::Local(PathBuf::from("/tmp/m.onnx")).to_string(),
            "/tmp/m.onnx"
        );
    }
}
