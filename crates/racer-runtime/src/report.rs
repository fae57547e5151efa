//! Namespaced metric groups and the per-iteration aggregator.
//!
//! Each stage of an iteration contributes one [`MetricGroup`]; [`aggregate`]
//! merges them in order into a single map.  Two groups producing the same
//! fully-qualified key is a [`RacerError::MetricCollision`]: nothing is
//! overwritten.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::time::Duration;

use racer_hal::{DEFAULT_HEALTH_KEYS, select_metrics};
use racer_types::{
    ActuationCommand, AnnotatedImage, Detection, InertialSample, MetricValue, RacerError,
};

/// Metrics sharing one key prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup {
    pub namespace: String,
    pub entries: Vec<(String, MetricValue)>,
}

impl MetricGroup {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Fully-qualified key: `"<namespace>/<name>"`.
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.namespace, name)
    }
}

pub fn control_group(cmd: &ActuationCommand) -> MetricGroup {
    MetricGroup::new("car")
        .with("steering", cmd.steering)
        .with("throttle", cmd.throttle)
}

/// Wall-clock seconds spent between frame read and health read.
pub fn timing_group(elapsed: Duration) -> MetricGroup {
    MetricGroup::new("inference").with("seconds", elapsed.as_secs_f64())
}

pub fn inertial_group(sample: &InertialSample) -> MetricGroup {
    let mut group = MetricGroup::new("car");
    for (prefix, axes) in [
        ("accelerometer", sample.acceleration),
        ("gyroscope", sample.angular_rate),
        ("magnetometer", sample.magnetic_field),
    ] {
        for (axis, v) in ["x", "y", "z"].into_iter().zip(axes) {
            group.push(format!("{prefix}_{axis}"), v);
        }
    }
    group
}

/// The default GPU/CPU/power keys from a health snapshot, under `system/`.
pub fn health_group(stats: &BTreeMap<String, f64>) -> MetricGroup {
    let mut group = MetricGroup::new("system");
    for (k, v) in select_metrics(stats, DEFAULT_HEALTH_KEYS) {
        group.push(k, v);
    }
    group
}

pub fn debug_group(image: AnnotatedImage) -> MetricGroup {
    MetricGroup::new("inference").with("frame", MetricValue::Image(image))
}

pub fn detection_group(detections: &[Detection]) -> MetricGroup {
    MetricGroup::new("inference").with("detections", detections.len() as f64)
}

/// Merge `groups` in order into one map.
///
/// # Errors
///
/// Returns [`RacerError::MetricCollision`] naming the first key produced
/// twice.
pub fn aggregate(groups: &[MetricGroup]) -> Result<BTreeMap<String, MetricValue>, RacerError> {
    let mut merged = BTreeMap::new();
    for group in groups {
        for (name, value) in &group.entries {
            match merged.entry(group.key(name)) {
                Entry::Vacant(slot) => {
                    slot.insert(value.clone());
                }
                Entry::Occupied(slot) => {
                    return Err(RacerError::MetricCollision(slot.key().clone()));
                }
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use racer_types::{LaneEstimate, Marker};

    #[test]
    fn groups_merge_into_disjoint_keys() {
        let sample = InertialSample {
            acceleration: [0.0, 0.0, 9.81],
            angular_rate: [0.1, 0.2, 0.3],
            magnetic_field: [1.0, 2.0, 3.0],
        };
        let stats: BTreeMap<String, f64> = [("gpu_temp".to_string(), 51.0)].into();
        let merged = aggregate(&[
            control_group(&ActuationCommand::new(-0.005, -1.0)),
            timing_group(Duration::from_millis(40)),
            inertial_group(&sample),
            health_group(&stats),
        ])
        .unwrap();

        assert_eq!(merged.len(), 2 + 1 + 9 + 1);
        assert_eq!(merged["car/steering"].as_number(), Some(-1.0));
        assert_eq!(merged["car/accelerometer_z"].as_number(), Some(9.81));
        assert_eq!(merged["car/gyroscope_y"].as_number(), Some(0.2));
        assert_eq!(merged["car/magnetometer_x"].as_number(), Some(1.0));
        assert_eq!(merged["system/gpu_temp"].as_number(), Some(51.0));
        assert!((merged["inference/seconds"].as_number().unwrap() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let err = aggregate(&[
            control_group(&ActuationCommand::NEUTRAL),
            MetricGroup::new("car").with("steering", 0.5),
        ])
        .unwrap_err();
        assert_eq!(err, RacerError::MetricCollision("car/steering".to_string()));
    }

    #[test]
    fn same_namespace_distinct_names_merge() {
        let merged = aggregate(&[
            timing_group(Duration::ZERO),
            detection_group(&[]),
        ])
        .unwrap();
        assert_eq!(merged["inference/detections"].as_number(), Some(0.0));
    }

    #[test]
    fn health_group_drops_unknown_keys() {
        let stats: BTreeMap<String, f64> = [
            ("cpu_temp".to_string(), 40.0),
            ("fan_rpm".to_string(), 3000.0),
        ]
        .into();
        let group = health_group(&stats);
        assert_eq!(group.entries.len(), 1);
        assert_eq!(group.key("cpu_temp"), "system/cpu_temp");
    }

    #[test]
    fn debug_group_carries_image() {
        let image = crate::recorder::annotate(&LaneEstimate::new(0.0, 0.0), None, 224, 5);
        let merged = aggregate(&[debug_group(image)]).unwrap();
        match &merged["inference/frame"] {
            MetricValue::Image(img) => assert_eq!(img.marker, Marker { x: 112, y: 112, radius: 5 }),
            other => panic!("unexpected value {other:?}"),
        }
    }
}
