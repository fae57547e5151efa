//! Inference engine traits and the capability-tagged [`Detector`].

use racer_types::{Detection, Frame, LaneEstimate, RacerError};
use tracing::trace;

use crate::nms::non_max_suppression;

/// Primary engine: regresses the track centre from a frame.
pub trait LaneModel: Send {
    /// Backend identifier, e.g. `"onnx"` or `"sim"`.
    fn name(&self) -> &str;

    /// Run the model on `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::InferenceFailure`] if the model call fails or the
    /// output is malformed.
    fn infer(&mut self, frame: &Frame) -> Result<LaneEstimate, RacerError>;
}

/// Secondary engine: proposes object boxes.  Thresholding and suppression
/// are applied by [`Detector::detect`], not by the backend.
pub trait ObjectDetector: Send {
    fn name(&self) -> &str;

    /// Class names indexed by `class_id`.
    fn labels(&self) -> &[String];

    /// Raw candidate boxes for `frame`.  Labels may be left empty; they are
    /// filled from [`labels`](Self::labels).
    fn propose(&mut self, frame: &Frame) -> Result<Vec<Detection>, RacerError>;
}

/// Confidence and IoU thresholds handed to non-max suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionThresholds {
    pub confidence: f32,
    pub iou: f32,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            iou: 0.45,
        }
    }
}

/// Whether a secondary object detector is attached to this run.
///
/// Decided once at start-up; the loop never inspects a nullable handle per
/// frame.
pub enum Detector {
    None,
    Present {
        backend: Box<dyn ObjectDetector>,
        thresholds: DetectionThresholds,
    },
}

impl Detector {
    pub fn present(backend: Box<dyn ObjectDetector>, thresholds: DetectionThresholds) -> Self {
        Detector::Present {
            backend,
            thresholds,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Detector::Present { .. })
    }

    /// Run the detector on `frame`.  Returns `Ok(None)` when no detector is
    /// attached.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`RacerError::InferenceFailure`].
    pub fn detect(&mut self, frame: &Frame) -> Result<Option<Vec<Detection>>, RacerError> {
        match self {
            Detector::None => Ok(None),
            Detector::Present {
                backend,
                thresholds,
            } => {
                let proposals = backend.propose(frame)?;
                let proposed = proposals.len();
                let mut kept = non_max_suppression(proposals, thresholds);
                resolve_labels(&mut kept, backend.labels());
                trace!(backend = backend.name(), proposed, kept = kept.len(), "detections");
                Ok(Some(kept))
            }
        }
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Detector::None => write!(f, "Detector::None"),
            Detector::Present {
                backend,
                thresholds,
            } => f
                .debug_struct("Detector::Present")
                .field("backend", &backend.name())
                .field("thresholds", thresholds)
                .finish(),
        }
    }
}

// Name each detection after its class.  Ids outside the table keep
// whatever label the backend gave them.
fn resolve_labels(detections: &mut [Detection], labels: &[String]) {
    for det in detections {
        if let Some(name) = labels.get(det.class_id as usize) {
            det.label.clone_from(name);
        }
    }
}

/// Reject non-finite model outputs.
///
/// # Errors
///
/// Returns [`RacerError::InferenceFailure`] when either component is NaN or
/// infinite.
pub fn checked_estimate(x: f64, y: f64) -> Result<LaneEstimate, RacerError> {
    if x.is_finite() && y.is_finite() {
        Ok(LaneEstimate::new(x, y))
    } else {
        Err(RacerError::InferenceFailure(format!(
            "model returned non-finite lane estimate ({x}, {y})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use racer_types::BoundingBox;

    struct FixedDetector {
        labels: Vec<String>,
        proposals: Vec<Detection>,
    }

    impl ObjectDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn propose(&mut self, _frame: &Frame) -> Result<Vec<Detection>, RacerError> {
            Ok(self.proposals.clone())
        }
    }

    fn det(conf: f32, min_x: f32) -> Detection {
        Detection {
            class_id: 0,
            label: "person".to_string(),
            bbox: BoundingBox::new(min_x, 0.0, min_x + 10.0, 10.0),
            confidence: conf,
        }
    }

    #[test]
    fn absent_detector_returns_none() {
        let mut detector = Detector::None;
        assert!(!detector.is_present());
        assert_eq!(detector.detect(&Frame::blank(4, 4)).unwrap(), None);
    }

    #[test]
    fn present_detector_applies_thresholds() {
        let backend = FixedDetector {
            labels: vec!["person".to_string()],
            proposals: vec![det(0.9, 0.0), det(0.8, 1.0), det(0.1, 50.0)],
        };
        let mut detector = Detector::present(Box::new(backend), DetectionThresholds::default());
        assert!(detector.is_present());
        let kept = detector.detect(&Frame::blank(4, 4)).unwrap().unwrap();
        // 0.8 overlaps 0.9 heavily; 0.1 is below the confidence threshold.
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn labels_are_resolved_from_class_ids() {
        let unnamed = |class_id, min_x| Detection {
            class_id,
            label: String::new(),
            bbox: BoundingBox::new(min_x, 0.0, min_x + 10.0, 10.0),
            confidence: 0.9,
        };
        let mut stray = unnamed(7, 100.0);
        stray.label = "unknown".to_string();
        let backend = FixedDetector {
            labels: vec!["person".to_string(), "car".to_string()],
            proposals: vec![unnamed(1, 0.0), stray],
        };
        let mut detector = Detector::present(Box::new(backend), DetectionThresholds::default());
        let kept = detector.detect(&Frame::blank(4, 4)).unwrap().unwrap();
        let labels: Vec<&str> = kept.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["car", "unknown"]);
    }

    #[test]
    fn checked_estimate_rejects_nan() {
        assert!(checked_estimate(0.1, -0.2).is_ok());
        assert!(matches!(
            checked_estimate(f64::NAN, 0.0),
            Err(RacerError::InferenceFailure(_))
        ));
        assert!(checked_estimate(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn detector_debug_names_backend() {
        let backend = FixedDetector {
            labels: Vec::new(),
            proposals: Vec::new(),
        };
        let detector = Detector::present(Box::new(backend), DetectionThresholds::default());
        assert!(format!("{detector:?}").contains("fixed"));
    }
}
