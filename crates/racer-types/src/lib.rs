use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A square RGB24 image captured once per loop iteration.
///
/// Frames are ephemeral: the iteration that reads one owns it and drops it
/// at the end.  Debug captures keep only the dimensions, never the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed RGB24 pixel data, row-major.
    pub data: Vec<u8>,
}

impl Frame {
    /// Build an all-black frame of the given dimensions.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 3],
        }
    }

    /// Return the `[r, g, b]` triple at `(x, y)`, or `None` when out of bounds
    /// or the buffer is short.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// `true` when the buffer length matches `width * height * 3`.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 3
    }
}

/// Normalised offset of the track centre from the image centre.
///
/// `x` runs left (-1) to right (+1), `y` runs top/far (-1) to bottom/near (+1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneEstimate {
    pub x: f64,
    pub y: f64,
}

impl LaneEstimate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Map the estimate onto a frame of side `extent` pixels.
    ///
    /// Each component follows `pixel = (value + 1) / 2 * extent`, truncated
    /// toward zero and clamped to `[0, extent]`.
    pub fn to_pixel(&self, extent: u32) -> (u32, u32) {
        (to_pixel_axis(self.x, extent), to_pixel_axis(self.y, extent))
    }
}

fn to_pixel_axis(value: f64, extent: u32) -> u32 {
    let extent_f = f64::from(extent);
    // `as` saturates and maps NaN to 0.
    ((value + 1.0) / 2.0 * extent_f).clamp(0.0, extent_f) as u32
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BoundingBox {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Box area; degenerate boxes have zero area.
    pub fn area(&self) -> f32 {
        (self.max_x - self.min_x).max(0.0) * (self.max_y - self.min_y).max(0.0)
    }

    /// Intersection-over-union with `other`, in `[0, 1]`.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let w = (self.max_x.min(other.max_x) - self.min_x.max(other.min_x)).max(0.0);
        let h = (self.max_y.min(other.max_y) - self.min_y.max(other.min_y)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// One object reported by the secondary detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// One reading of the 9-axis motion sensor.  Telemetry only; never fed into
/// the control policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InertialSample {
    /// Linear acceleration, x/y/z.
    pub acceleration: [f64; 3],
    /// Angular rate (gyroscope), x/y/z.
    pub angular_rate: [f64; 3],
    /// Magnetic field, x/y/z.
    pub magnetic_field: [f64; 3],
}

/// Throttle and steering written to the actuator.  Each command fully
/// replaces the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuationCommand {
    pub throttle: f64,
    pub steering: f64,
}

impl ActuationCommand {
    /// Stopped, wheels straight.
    pub const NEUTRAL: ActuationCommand = ActuationCommand {
        throttle: 0.0,
        steering: 0.0,
    };

    pub fn new(throttle: f64, steering: f64) -> Self {
        Self { throttle, steering }
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }
}

impl Default for ActuationCommand {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Circle drawn at the lane estimate on an annotated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

/// Labelled detection box on an annotated frame.  Coordinates are in the
/// pixel domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxAnnotation {
    pub class_id: u32,
    pub caption: String,
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
    pub confidence: f32,
}

/// Structured annotation payload.  The telemetry sink renders the marker and
/// boxes itself; no pixel buffer travels with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedImage {
    pub width: u32,
    pub height: u32,
    pub marker: Marker,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<BoxAnnotation>,
}

/// Value carried under one telemetry key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Image(AnnotatedImage),
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// The single aggregated report forwarded to the telemetry sink per
/// iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// Identifier of the drive run that produced this report.
    pub run_id: Uuid,
    /// 1-based iteration number within the run.
    pub frame: u64,
    pub timestamp: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
}

/// Error taxonomy for the control loop and its collaborators.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RacerError {
    /// Sensor, actuator or model acquisition failed before the loop started.
    #[error("Init failed for {component}: {details}")]
    FatalInit { component: String, details: String },

    /// A sensor read failed mid-loop.  Not retried.
    #[error("Sensor failure on {component}: {details}")]
    SensorFailure { component: String, details: String },

    /// The model call failed or returned malformed output.
    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    /// Two metric groups produced the same fully-qualified key.
    #[error("Metric key collision: {0}")]
    MetricCollision(String),

    /// The telemetry sink could not accept a report.
    #[error("Telemetry sink error: {0}")]
    Telemetry(String),

    /// The configuration record is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RacerError {
    /// Convenience constructor for [`RacerError::SensorFailure`].
    pub fn sensor(component: impl Into<String>, details: impl Into<String>) -> Self {
        RacerError::SensorFailure {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Convenience constructor for [`RacerError::FatalInit`].
    pub fn init(component: impl Into<String>, details: impl Into<String>) -> Self {
        RacerError::FatalInit {
            component: component.into(),
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_pixel_mapping_hits_boundaries() {
        assert_eq!(LaneEstimate::new(-1.0, -1.0).to_pixel(224), (0, 0));
        assert_eq!(LaneEstimate::new(0.0, 0.0).to_pixel(224), (112, 112));
        assert_eq!(LaneEstimate::new(1.0, 1.0).to_pixel(224), (224, 224));
    }

    #[test]
    fn lane_pixel_mapping_half_offset() {
        let (x, y) = LaneEstimate::new(0.5, -1.0).to_pixel(224);
        assert_eq!(x, 168);
        assert_eq!(y, 0);
    }

    #[test]
    fn lane_pixel_mapping_clamps_out_of_range_values() {
        assert_eq!(LaneEstimate::new(-1.5, 1.7).to_pixel(224), (0, 224));
        assert_eq!(LaneEstimate::new(f64::NAN, 0.0).to_pixel(224), (0, 112));
    }

    #[test]
    fn frame_pixel_access() {
        let mut frame = Frame::blank(2, 2);
        // (1, 1) is the last pixel.
        frame.data[9..12].copy_from_slice(&[10, 20, 30]);
        assert_eq!(frame.pixel(1, 1), Some([10, 20, 30]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.pixel(2, 0), None);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn bounding_box_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // intersection 50, union 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        let far = BoundingBox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn neutral_command_is_default() {
        assert!(ActuationCommand::default().is_neutral());
        assert!(!ActuationCommand::new(-0.005, 0.1).is_neutral());
    }

    #[test]
    fn metric_value_serializes_untagged() {
        let json = serde_json::to_string(&MetricValue::Number(1.5)).unwrap();
        assert_eq!(json, "1.5");

        let image = MetricValue::Image(AnnotatedImage {
            width: 224,
            height: 224,
            marker: Marker {
                x: 168,
                y: 0,
                radius: 5,
            },
            boxes: Vec::new(),
        });
        let json = serde_json::to_string(&image).unwrap();
        assert!(json.contains("\"marker\""));
        assert!(!json.contains("boxes"));
    }

    #[test]
    fn report_roundtrip() {
        let mut metrics = BTreeMap::new();
        metrics.insert("car/steering".to_string(), MetricValue::Number(-1.0));
        let report = TelemetryReport {
            run_id: Uuid::new_v4(),
            frame: 3,
            timestamp: Utc::now(),
            metrics,
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: TelemetryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.run_id, back.run_id);
        assert_eq!(back.metrics["car/steering"].as_number(), Some(-1.0));
    }

    #[test]
    fn racer_error_display() {
        let err = RacerError::init("camera", "device busy");
        assert!(err.to_string().contains("camera"));

        let err = RacerError::sensor("imu", "i2c timeout");
        assert!(err.to_string().contains("Sensor failure on imu"));
    }
}
