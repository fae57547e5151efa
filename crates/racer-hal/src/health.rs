//! System-health source (GPU/CPU temperature, power draw, utilisation).

use std::collections::BTreeMap;

use racer_types::RacerError;

/// Reader for named numeric system metrics.
///
/// Keys are short snake-case names (`"gpu_temp"`, `"power_cur"`, …); the
/// telemetry aggregator adds the namespace.
pub trait HealthSource: Send + Sync {
    fn id(&self) -> &str;

    fn probe(&mut self) -> Result<(), RacerError> {
        Ok(())
    }

    /// Return the current metrics snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::SensorFailure`] when the stats daemon cannot be
    /// queried.
    fn read(&mut self) -> Result<BTreeMap<String, f64>, RacerError>;
}

/// Metrics forwarded to telemetry by default.
pub const DEFAULT_HEALTH_KEYS: &[&str] = &["gpu_util", "gpu_temp", "cpu_temp", "power_avg", "power_cur"];

/// Keep only the metrics named in `keys`.  Missing keys
/// are skipped.
pub fn select_metrics(stats: &BTreeMap<String, f64>, keys: &[&str]) -> BTreeMap<String, f64> {
    keys.iter()
        .filter_map(|k| stats.get(*k).map(|v| (k.to_string(), *v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_metrics_filters_and_skips_missing() {
        let mut stats = BTreeMap::new();
        stats.insert("gpu_temp".to_string(), 41.5);
        stats.insert("fan".to_string(), 3000.0);
        stats.insert("power_cur".to_string(), 4200.0);

        let picked = select_metrics(&stats, &["gpu_temp", "power_cur", "cpu_temp"]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked["gpu_temp"], 41.5);
        assert!(!picked.contains_key("fan"));
    }
}
