//! Simulated inference engines for bench runs and tests.
//!
//! [`SimLaneModel`] finds the centroid of bright pixels, which is exactly
//! what the simulated camera in `racer-hal` paints along the track centre.

use racer_types::{BoundingBox, Detection, Frame, LaneEstimate, RacerError};

use crate::engine::{LaneModel, ObjectDetector, checked_estimate};

/// Per-pixel channel mean at or above which a pixel counts as track.
const BRIGHT_THRESHOLD: u16 = 200;

enum LaneMode {
    Centroid,
    Fixed(LaneEstimate),
}

/// Lane model that regresses the centroid of bright pixels, or returns a
/// fixed estimate.
pub struct SimLaneModel {
    mode: LaneMode,
    calls: u64,
    fail_after: Option<u64>,
}

impl SimLaneModel {
    /// Centroid model.  Frames without bright pixels yield `(0, 0)`.
    pub fn new() -> Self {
        Self {
            mode: LaneMode::Centroid,
            calls: 0,
            fail_after: None,
        }
    }

    /// Always return `estimate`, regardless of the frame.
    pub fn fixed(estimate: LaneEstimate) -> Self {
        Self {
            mode: LaneMode::Fixed(estimate),
            calls: 0,
            fail_after: None,
        }
    }

    /// Fail with [`RacerError::InferenceFailure`] once `n` frames have been
    /// processed.
    pub fn failing_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    fn centroid(frame: &Frame) -> Result<LaneEstimate, RacerError> {
        if !frame.is_well_formed() || frame.width == 0 || frame.height == 0 {
            return Err(RacerError::InferenceFailure(format!(
                "malformed {}x{} frame",
                frame.width, frame.height
            )));
        }
        let width = frame.width as usize;
        let (mut sum_x, mut sum_y, mut count) = (0.0f64, 0.0f64, 0u64);
        for (i, px) in frame.data.chunks_exact(3).enumerate() {
            let mean = (u16::from(px[0]) + u16::from(px[1]) + u16::from(px[2])) / 3;
            if mean >= BRIGHT_THRESHOLD {
                sum_x += (i % width) as f64;
                sum_y += (i / width) as f64;
                count += 1;
            }
        }
        if count == 0 {
            return Ok(LaneEstimate::new(0.0, 0.0));
        }
        let cx = sum_x / count as f64;
        let cy = sum_y / count as f64;
        checked_estimate(
            2.0 * cx / f64::from(frame.width) - 1.0,
            2.0 * cy / f64::from(frame.height) - 1.0,
        )
    }
}

impl Default for SimLaneModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LaneModel for SimLaneModel {
    fn name(&self) -> &str {
        "sim"
    }

    fn infer(&mut self, frame: &Frame) -> Result<LaneEstimate, RacerError> {
        if self.fail_after.is_some_and(|n| self.calls >= n) {
            return Err(RacerError::InferenceFailure(
                "simulated engine fault".to_string(),
            ));
        }
        self.calls += 1;
        match self.mode {
            LaneMode::Centroid => Self::centroid(frame),
            LaneMode::Fixed(estimate) => Ok(estimate),
        }
    }
}

/// Object detector that proposes the same boxes for every frame.
pub struct SimDetector {
    labels: Vec<String>,
    proposals: Vec<Detection>,
}

impl SimDetector {
    pub fn new(labels: Vec<String>, proposals: Vec<Detection>) -> Self {
        Self { labels, proposals }
    }

    /// A couple of plausible track-side objects scaled to `resolution`.
    /// Proposals carry only class ids; names come from the label table.
    pub fn demo(resolution: u32) -> Self {
        let s = resolution as f32;
        let labels = vec!["person".to_string(), "car".to_string(), "stop sign".to_string()];
        let proposals = vec![
            Detection {
                class_id: 2,
                label: String::new(),
                bbox: BoundingBox::new(0.70 * s, 0.10 * s, 0.85 * s, 0.30 * s),
                confidence: 0.82,
            },
            Detection {
                class_id: 1,
                label: String::new(),
                bbox: BoundingBox::new(0.05 * s, 0.40 * s, 0.35 * s, 0.70 * s),
                confidence: 0.64,
            },
            Detection {
                class_id: 1,
                label: String::new(),
                bbox: BoundingBox::new(0.06 * s, 0.41 * s, 0.36 * s, 0.71 * s),
                confidence: 0.40,
            },
        ];
        Self { labels, proposals }
    }
}

impl ObjectDetector for SimDetector {
    fn name(&self) -> &str {
        "sim"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn propose(&mut self, _frame: &Frame) -> Result<Vec<Detection>, RacerError> {
        Ok(self.proposals.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DetectionThresholds, Detector};

    fn stripe_frame(side: u32, col: u32) -> Frame {
        let mut frame = Frame::blank(side, side);
        for row in 0..side as usize {
            let idx = (row * side as usize + col as usize) * 3;
            frame.data[idx..idx + 3].fill(255);
        }
        frame
    }

    #[test]
    fn centroid_tracks_stripe_column() {
        let mut model = SimLaneModel::new();
        let est = model.infer(&stripe_frame(64, 48)).unwrap();
        assert!((est.x - 0.5).abs() < 1e-9);
        // full-height stripe: row centroid 31.5 of 64
        assert!((est.y - (2.0 * 31.5 / 64.0 - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn dark_frame_yields_centre() {
        let mut model = SimLaneModel::new();
        let est = model.infer(&Frame::blank(16, 16)).unwrap();
        assert_eq!(est, LaneEstimate::new(0.0, 0.0));
    }

    #[test]
    fn fixed_model_ignores_frame() {
        let mut model = SimLaneModel::fixed(LaneEstimate::new(0.5, -1.0));
        assert_eq!(
            model.infer(&stripe_frame(8, 1)).unwrap(),
            LaneEstimate::new(0.5, -1.0)
        );
    }

    #[test]
    fn failing_model_errors_after_limit() {
        let mut model = SimLaneModel::new().failing_after(1);
        assert!(model.infer(&Frame::blank(4, 4)).is_ok());
        assert!(matches!(
            model.infer(&Frame::blank(4, 4)),
            Err(RacerError::InferenceFailure(_))
        ));
    }

    #[test]
    fn malformed_frame_is_inference_failure() {
        let mut model = SimLaneModel::new();
        let frame = Frame {
            width: 4,
            height: 4,
            data: vec![0; 3],
        };
        assert!(model.infer(&frame).is_err());
    }

    #[test]
    fn demo_detector_survives_nms_with_two_boxes() {
        let mut detector = Detector::present(
            Box::new(SimDetector::demo(224)),
            DetectionThresholds::default(),
        );
        let kept = detector.detect(&Frame::blank(224, 224)).unwrap().unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].label, "stop sign");
    }
}
