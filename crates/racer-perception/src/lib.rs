//! `racer-perception` – Inference engines.
//!
//! Turns a camera [`Frame`][racer_types::Frame] into the two things the
//! drive loop needs: a [`LaneEstimate`][racer_types::LaneEstimate] for the
//! control policy and, when enabled, a list of object
//! [`Detection`][racer_types::Detection]s for the debug overlay.
//!
//! # Modules
//!
//! - [`engine`] – [`LaneModel`][engine::LaneModel] and
//!   [`ObjectDetector`][engine::ObjectDetector] traits, plus the
//!   capability-tagged [`Detector`][engine::Detector] chosen once at start-up.
//! - [`nms`] – confidence filtering and per-class non-max suppression.
//! - [`preprocess`] – RGB24 → CHW `f32` tensor conversion.
//! - [`sim`] – [`SimLaneModel`][sim::SimLaneModel] (bright-pixel centroid)
//!   and [`SimDetector`][sim::SimDetector] for bench runs and tests.
//! - `onnx` (feature `backend-tract`) – ONNX lane regression model executed
//!   with `tract-onnx`.

pub mod engine;
pub mod nms;
#[cfg(feature = "backend-tract")]
pub mod onnx;
pub mod preprocess;
pub mod sim;

pub use engine::{DetectionThresholds, Detector, LaneModel, ObjectDetector};
