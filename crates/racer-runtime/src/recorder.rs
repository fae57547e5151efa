//! [`DebugRecorder`] – bounded debug session with periodic frame capture.
//!
//! The recorder counts frames, flags every `debug_freq`-th one for capture,
//! and reports `done` once `framerate * debug_seconds` frames have passed.
//! When debug is off there is no recorder at all and the loop runs until it
//! is stopped.
//!
//! ```text
//!   Armed ──advance()──► Capturing ──advance()──► Armed ── … ──► Done
//!                         (count % freq == 0)            (count == budget)
//! ```

use racer_types::{AnnotatedImage, BoxAnnotation, Detection, LaneEstimate, Marker};
use tracing::debug;

use crate::config::DriveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Counting frames, nothing to capture on the current one.
    Armed,
    /// The current frame should be annotated and attached to telemetry.
    Capturing,
    /// The frame budget has been spent.  Terminal.
    Done,
}

/// Outcome of one [`DebugRecorder::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderStep {
    /// Frames counted so far, including this one.
    pub frame_count: u64,
    pub capture: bool,
    pub done: bool,
}

#[derive(Debug, Clone)]
pub struct DebugRecorder {
    frame_count: u64,
    budget: u64,
    freq: u64,
    marker_radius: u32,
    state: RecorderState,
}

impl DebugRecorder {
    /// Returns `None` when `cfg.debug` is off.
    pub fn new(cfg: &DriveConfig) -> Option<Self> {
        if !cfg.debug {
            return None;
        }
        Some(Self {
            frame_count: 0,
            budget: cfg.debug_frame_budget(),
            freq: u64::from(cfg.debug_freq.max(1)),
            marker_radius: cfg.marker_radius,
            state: RecorderState::Armed,
        })
    }

    /// Count one frame.
    ///
    /// The capture check runs before the budget check, so the last frame of
    /// the session is captured when it lands on a capture boundary.  Once
    /// done the counter stops moving and every call reports done again.
    pub fn advance(&mut self) -> RecorderStep {
        if self.state == RecorderState::Done {
            return RecorderStep {
                frame_count: self.frame_count,
                capture: false,
                done: true,
            };
        }
        self.frame_count += 1;
        let capture = self.frame_count % self.freq == 0;
        let done = self.frame_count >= self.budget;
        self.state = if done {
            RecorderState::Done
        } else if capture {
            RecorderState::Capturing
        } else {
            RecorderState::Armed
        };
        if done {
            debug!(frames = self.frame_count, "debug session complete");
        }
        RecorderStep {
            frame_count: self.frame_count,
            capture,
            done,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Build the annotation payload for a captured frame of `extent` pixels
    /// per side.
    pub fn annotate(
        &self,
        lane: &LaneEstimate,
        detections: Option<&[Detection]>,
        extent: u32,
    ) -> AnnotatedImage {
        annotate(lane, detections, extent, self.marker_radius)
    }
}

/// Marker at the lane estimate plus one labelled box per detection.
pub fn annotate(
    lane: &LaneEstimate,
    detections: Option<&[Detection]>,
    extent: u32,
    marker_radius: u32,
) -> AnnotatedImage {
    let (x, y) = lane.to_pixel(extent);
    let boxes = detections
        .unwrap_or_default()
        .iter()
        .map(|d| BoxAnnotation {
            class_id: d.class_id,
            caption: d.label.clone(),
            min_x: d.bbox.min_x as i64,
            min_y: d.bbox.min_y as i64,
            max_x: d.bbox.max_x as i64,
            max_y: d.bbox.max_y as i64,
            confidence: d.confidence,
        })
        .collect();
    AnnotatedImage {
        width: extent,
        height: extent,
        marker: Marker {
            x,
            y,
            radius: marker_radius,
        },
        boxes,
    }
}
