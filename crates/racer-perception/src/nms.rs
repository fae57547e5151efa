//! Confidence filtering and greedy per-class non-max suppression.
//!
//! # Algorithm
//!
//! 1. Drop candidates whose confidence is below `thresholds.confidence`.
//! 2. Sort the survivors by confidence, highest first.
//! 3. Walk the sorted list and keep a candidate only if its IoU with every
//!    already-kept box of the same class is at most `thresholds.iou`.

use std::cmp::Ordering;

use racer_types::Detection;

use crate::engine::DetectionThresholds;

pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    thresholds: &DetectionThresholds,
) -> Vec<Detection> {
    candidates.retain(|d| d.confidence.is_finite() && d.confidence >= thresholds.confidence);
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > thresholds.iou);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use racer_types::BoundingBox;

    fn det(class_id: u32, conf: f32, bbox: BoundingBox) -> Detection {
        Detection {
            class_id,
            label: format!("class_{class_id}"),
            bbox,
            confidence: conf,
        }
    }

    fn thresholds() -> DetectionThresholds {
        DetectionThresholds {
            confidence: 0.3,
            iou: 0.5,
        }
    }

    #[test]
    fn drops_low_confidence() {
        let out = non_max_suppression(
            vec![det(0, 0.2, BoundingBox::new(0.0, 0.0, 5.0, 5.0))],
            &thresholds(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn keeps_highest_of_overlapping_pair() {
        let out = non_max_suppression(
            vec![
                det(0, 0.6, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                det(0, 0.9, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            ],
            &thresholds(),
        );
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn overlapping_boxes_of_different_classes_both_survive() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let out = non_max_suppression(
            vec![det(0, 0.9, bbox), det(2, 0.8, bbox)],
            &thresholds(),
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn disjoint_boxes_are_sorted_by_confidence() {
        let out = non_max_suppression(
            vec![
                det(0, 0.4, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
                det(0, 0.7, BoundingBox::new(50.0, 50.0, 60.0, 60.0)),
            ],
            &thresholds(),
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].confidence > out[1].confidence);
    }

    #[test]
    fn nan_confidence_is_discarded() {
        let out = non_max_suppression(
            vec![det(0, f32::NAN, BoundingBox::new(0.0, 0.0, 10.0, 10.0))],
            &thresholds(),
        );
        assert!(out.is_empty());
    }
}
