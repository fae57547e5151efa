//! [`StageWatchdog`] – per-stage time budgets for the drive loop.
//!
//! Each blocking stage of an iteration (camera, inertial read, inference,
//! health read) is registered with a budget.  After a stage returns, the
//! loop reports its elapsed time with [`StageWatchdog::observe`]; overruns
//! are counted and flagged as [`StageHealth::OverBudget`].  Stages are never
//! interrupted: a stage that blocks forever blocks the loop.

use std::collections::HashMap;
use std::time::Duration;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Health of a single stage after its latest observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageHealth {
    /// The stage finished within its budget.
    Healthy,
    /// The stage took longer than its budget.
    OverBudget,
}

pub const CAMERA: &str = "camera";
pub const IMU: &str = "imu";
pub const INFERENCE: &str = "inference";
pub const HEALTH: &str = "health";

/// Stages the drive loop reports on, in iteration order.
pub const STAGES: [&str; 4] = [CAMERA, IMU, INFERENCE, HEALTH];

// ────────────────────────────────────────────────────────────────────────────
// Internal entry
// ────────────────────────────────────────────────────────────────────────────

struct StageEntry {
    budget: Duration,
    overruns: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Watchdog
// ────────────────────────────────────────────────────────────────────────────

/// # Example
///
/// ```
/// use std::time::Duration;
/// use racer_runtime::watchdog::{StageHealth, StageWatchdog};
///
/// let mut wd = StageWatchdog::new();
/// wd.register("camera", Duration::from_millis(100));
///
/// assert_eq!(wd.observe("camera", Duration::from_millis(30)), StageHealth::Healthy);
/// assert_eq!(wd.observe("camera", Duration::from_millis(130)), StageHealth::OverBudget);
/// assert_eq!(wd.overruns("camera"), 1);
/// ```
#[derive(Default)]
pub struct StageWatchdog {
    stages: HashMap<String, StageEntry>,
}

impl StageWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watchdog with every loop stage budgeted at one frame period.
    pub fn for_framerate(framerate: u32) -> Self {
        let period = Duration::from_secs(1) / framerate.max(1);
        let mut wd = Self::new();
        for stage in STAGES {
            wd.register(stage, period);
        }
        wd
    }

    /// Register `stage` with `budget`.  Re-registering resets its counters.
    pub fn register(&mut self, stage: &str, budget: Duration) {
        self.stages.insert(
            stage.to_string(),
            StageEntry {
                budget,
                overruns: 0,
            },
        );
    }

    /// Record that `stage` took `elapsed`.
    ///
    /// Unregistered stages are ignored and reported healthy.
    pub fn observe(&mut self, stage: &str, elapsed: Duration) -> StageHealth {
        let Some(entry) = self.stages.get_mut(stage) else {
            return StageHealth::Healthy;
        };
        if elapsed > entry.budget {
            entry.overruns += 1;
            StageHealth::OverBudget
        } else {
            StageHealth::Healthy
        }
    }

    pub fn budget(&self, stage: &str) -> Option<Duration> {
        self.stages.get(stage).map(|e| e.budget)
    }

    pub fn overruns(&self, stage: &str) -> u64 {
        self.stages.get(stage).map_or(0, |e| e.overruns)
    }

    pub fn total_overruns(&self) -> u64 {
        self.stages.values().map(|e| e.overruns).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_at_budget_is_healthy() {
        let mut wd = StageWatchdog::new();
        wd.register(INFERENCE, Duration::from_millis(50));
        assert_eq!(wd.observe(INFERENCE, Duration::from_millis(50)), StageHealth::Healthy);
        assert_eq!(wd.overruns(INFERENCE), 0);
    }

    #[test]
    fn overrun_is_counted_and_reported() {
        let mut wd = StageWatchdog::new();
        wd.register(CAMERA, Duration::from_millis(10));
        assert_eq!(wd.observe(CAMERA, Duration::from_millis(25)), StageHealth::OverBudget);
        assert_eq!(wd.observe(CAMERA, Duration::from_millis(5)), StageHealth::Healthy);
        assert_eq!(wd.overruns(CAMERA), 1);
    }

    #[test]
    fn unknown_stage_is_ignored() {
        let mut wd = StageWatchdog::new();
        assert_eq!(wd.budget("lidar"), None);
        assert_eq!(wd.observe("lidar", Duration::from_secs(9)), StageHealth::Healthy);
        assert_eq!(wd.total_overruns(), 0);
    }

    #[test]
    fn framerate_sets_one_period_budget() {
        let wd = StageWatchdog::for_framerate(10);
        for stage in STAGES {
            assert_eq!(wd.budget(stage), Some(Duration::from_millis(100)));
        }
    }

    #[test]
    fn re_register_resets_counters() {
        let mut wd = StageWatchdog::new();
        wd.register(IMU, Duration::from_millis(1));
        wd.observe(IMU, Duration::from_millis(2));
        wd.register(IMU, Duration::from_millis(1));
        assert_eq!(wd.overruns(IMU), 0);
    }
}
