//! [`DriveLoop`] – the perception-to-actuation control loop.
//!
//! One synchronous thread runs every iteration end to end:
//!
//! 1. **Stop check** – leave with [`LoopOutcome::Stopped`] if the
//!    [`StopSignal`] has fired.
//! 2. **Sense** – read a camera frame, then an inertial sample.
//! 3. **Infer** – regress the lane position and, when a detector is present,
//!    run object detection on the same frame.
//! 4. **Act** – map the estimate through the [`ControlPolicy`] and send the
//!    command to the actuator straight away.
//! 5. **Record** – advance the debug recorder and annotate captured frames.
//! 6. **Report** – read system health, stop the timer, aggregate every
//!    metric group and hand the report to the sink.  When the debug session
//!    is done the loop leaves after this step.
//!
//! There is no pacing sleep: the loop runs as fast as its slowest blocking
//! stage.  The actuator lives in an [`ActuatorGuard`] for the whole run, so
//! it receives a neutral stop on every exit path, unwinding included.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use chrono::Utc;
use racer_hal::{Actuator, Camera, HealthSource, MotionSensor, Rig, RigBuilder};
use racer_perception::{Detector, LaneModel};
use racer_types::{ActuationCommand, RacerError, TelemetryReport};
use tracing::{debug, debug_span, error, info, warn};
use uuid::Uuid;

use crate::config::DriveConfig;
use crate::policy::ControlPolicy;
use crate::ratelimit::LogThrottle;
use crate::recorder::DebugRecorder;
use crate::report::{
    MetricGroup, aggregate, control_group, debug_group, detection_group, health_group,
    inertial_group, timing_group,
};
use crate::sink::TelemetrySink;
use crate::watchdog::{self, StageHealth, StageWatchdog};

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

/// Cooperative cancellation token, checked once per iteration.
///
/// Clones share the flag, so one copy can live in a signal handler while the
/// loop holds another.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuator guard
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the actuator for the length of a run and leaves it neutral when
/// dropped.
pub struct ActuatorGuard {
    actuator: Box<dyn Actuator>,
    stopped: bool,
}

impl ActuatorGuard {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self {
            actuator,
            stopped: false,
        }
    }

    pub fn set(&mut self, cmd: ActuationCommand) -> Result<(), RacerError> {
        self.stopped = false;
        self.actuator.set(cmd)
    }

    /// Send the neutral stop command now instead of waiting for drop.
    pub fn shutdown(&mut self) -> Result<(), RacerError> {
        self.stopped = true;
        self.actuator.stop()
    }

    pub fn last_command(&self) -> ActuationCommand {
        self.actuator.last_command()
    }
}

impl Drop for ActuatorGuard {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        match self.actuator.stop() {
            Ok(()) => debug!(actuator = self.actuator.id(), "actuator neutralised on drop"),
            Err(e) => error!(actuator = self.actuator.id(), error = %e, "failed to neutralise actuator"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run results
// ─────────────────────────────────────────────────────────────────────────────

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The [`StopSignal`] fired.
    Stopped,
    /// The debug session spent its frame budget.
    DebugDone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: LoopOutcome,
    /// Iterations that ran to completion.
    pub iterations: u64,
    /// Annotated frames attached to telemetry.
    pub captures: u64,
    /// Stage budget overruns across all stages.
    pub overruns: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// DriveLoop
// ─────────────────────────────────────────────────────────────────────────────

/// An initialised run: configuration checked, rig acquired, nothing actuated
/// yet.
pub struct DriveLoop {
    run_id: Uuid,
    cfg: DriveConfig,
    rig: Rig,
    lane_model: Box<dyn LaneModel>,
    detector: Detector,
    sink: Box<dyn TelemetrySink>,
}

impl DriveLoop {
    /// Validate `cfg`, settle the detector capability and acquire the rig.
    ///
    /// A detector handed in while `cfg.detect_objects` is off is dropped.
    ///
    /// # Errors
    ///
    /// - [`RacerError::Config`] when `cfg` is invalid.
    /// - [`RacerError::FatalInit`] when object detection is enabled without a
    ///   detector, or a driver is missing or fails its probe.
    pub fn init(
        cfg: DriveConfig,
        rig: RigBuilder,
        lane_model: Box<dyn LaneModel>,
        detector: Detector,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, RacerError> {
        cfg.validate()?;

        let detector = match (cfg.detect_objects, detector) {
            (true, Detector::None) => {
                return Err(RacerError::init(
                    "detector",
                    "object detection is enabled but no detector was supplied",
                ));
            }
            (false, d) if d.is_present() => {
                debug!("object detection disabled, ignoring supplied detector");
                Detector::None
            }
            (_, d) => d,
        };

        let rig = rig.build()?;
        let run_id = Uuid::new_v4();

        info!(
            %run_id,
            lane_model = lane_model.name(),
            detector = ?detector,
            framerate = cfg.framerate,
            debug = cfg.debug,
            model = %cfg.model,
            "drive loop initialised"
        );

        Ok(Self {
            run_id,
            cfg,
            rig,
            lane_model,
            detector,
            sink,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &DriveConfig {
        &self.cfg
    }

    /// Drive until the stop signal fires, the debug session completes, or a
    /// stage fails.
    ///
    /// The actuator is left neutral before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Propagates the first sensor, inference or actuator error.
    pub fn run(self, stop: &StopSignal) -> Result<RunSummary, RacerError> {
        let DriveLoop {
            run_id,
            cfg,
            rig,
            lane_model,
            detector,
            sink,
        } = self;
        let Rig {
            camera,
            motion,
            health,
            actuator,
        } = rig;

        let mut guard = ActuatorGuard::new(actuator);
        let mut core = LoopCore {
            run_id,
            policy: ControlPolicy::from_config(&cfg),
            recorder: DebugRecorder::new(&cfg),
            watchdog: StageWatchdog::for_framerate(cfg.framerate),
            camera,
            motion,
            health,
            lane_model,
            detector,
            sink,
            iterations: 0,
            captures: 0,
            publish_throttle: LogThrottle::default(),
            overrun_throttle: LogThrottle::default(),
        };

        info!(%run_id, "drive loop started");
        let result = core.drive(&mut guard, stop);

        if let Err(e) = guard.shutdown() {
            error!(error = %e, "failed to neutralise actuator");
        }
        if let Err(e) = core.sink.flush() {
            warn!(error = %e, "telemetry flush failed");
        }

        match result {
            Ok(outcome) => {
                let summary = RunSummary {
                    run_id,
                    outcome,
                    iterations: core.iterations,
                    captures: core.captures,
                    overruns: core.watchdog.total_overruns(),
                };
                info!(
                    %run_id,
                    outcome = ?summary.outcome,
                    iterations = summary.iterations,
                    captures = summary.captures,
                    overruns = summary.overruns,
                    "drive loop finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(%run_id, iterations = core.iterations, error = %e, "drive loop aborted");
                Err(e)
            }
        }
    }
}

// Everything the loop needs once the actuator has moved into its guard.
struct LoopCore {
    run_id: Uuid,
    policy: ControlPolicy,
    recorder: Option<DebugRecorder>,
    watchdog: StageWatchdog,
    camera: Box<dyn Camera>,
    motion: Box<dyn MotionSensor>,
    health: Box<dyn HealthSource>,
    lane_model: Box<dyn LaneModel>,
    detector: Detector,
    sink: Box<dyn TelemetrySink>,
    iterations: u64,
    captures: u64,
    publish_throttle: LogThrottle,
    overrun_throttle: LogThrottle,
}

impl LoopCore {
    fn drive(&mut self, guard: &mut ActuatorGuard, stop: &StopSignal) -> Result<LoopOutcome, RacerError> {
        loop {
            if stop.is_triggered() {
                info!(iterations = self.iterations, "stop requested");
                return Ok(LoopOutcome::Stopped);
            }
            let done = self.iterate(guard)?;
            self.iterations += 1;
            if done {
                return Ok(LoopOutcome::DebugDone);
            }
        }
    }

    /// One full iteration.  Returns `true` once the debug session is done.
    fn iterate(&mut self, guard: &mut ActuatorGuard) -> Result<bool, RacerError> {
        let frame_no = self.iterations + 1;
        let span = debug_span!("iteration", frame = frame_no);
        let _enter = span.enter();

        let started = Instant::now();

        let t = Instant::now();
        let frame = self.camera.read()?;
        self.check_stage(watchdog::CAMERA, t.elapsed());

        let t = Instant::now();
        let inertial = self.motion.read_sample()?;
        self.check_stage(watchdog::IMU, t.elapsed());

        let t = Instant::now();
        let lane = self.lane_model.infer(&frame)?;
        let detections = self.detector.detect(&frame)?;
        self.check_stage(watchdog::INFERENCE, t.elapsed());

        let cmd = self.policy.apply(&lane);
        guard.set(cmd)?;
        debug!(x = lane.x, y = lane.y, steering = cmd.steering, throttle = cmd.throttle, "command applied");

        let mut done = false;
        let mut captured = None;
        if let Some(recorder) = self.recorder.as_mut() {
            let step = recorder.advance();
            if step.capture {
                captured = Some(recorder.annotate(&lane, detections.as_deref(), frame.width));
                self.captures += 1;
                debug!(frame_count = step.frame_count, "frame captured");
            }
            done = step.done;
        }

        let t = Instant::now();
        let stats = self.health.read()?;
        self.check_stage(watchdog::HEALTH, t.elapsed());

        let elapsed = started.elapsed();

        let mut groups = vec![
            control_group(&cmd),
            timing_group(elapsed),
            inertial_group(&inertial),
            health_group(&stats),
        ];
        if let Some(detections) = &detections {
            groups.push(detection_group(detections));
        }
        if let Some(image) = captured {
            groups.push(debug_group(image));
        }
        self.publish(frame_no, &groups);

        Ok(done)
    }

    fn check_stage(&mut self, stage: &str, elapsed: Duration) {
        if self.watchdog.observe(stage, elapsed) == StageHealth::OverBudget {
            if let Some(suppressed) = self.overrun_throttle.admit() {
                warn!(
                    stage,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    budget_ms = self
                        .watchdog
                        .budget(stage)
                        .map_or(0.0, |b| b.as_secs_f64() * 1000.0),
                    suppressed,
                    "stage over budget"
                );
            }
        }
    }

    // Fire-and-forget: a failure here is logged and the control path
    // carries on.
    fn publish(&mut self, frame_no: u64, groups: &[MetricGroup]) {
        let result = aggregate(groups).and_then(|metrics| {
            self.sink.emit(TelemetryReport {
                run_id: self.run_id,
                frame: frame_no,
                timestamp: Utc::now(),
                metrics,
            })
        });
        if let Err(e) = result {
            if let Some(suppressed) = self.publish_throttle.admit() {
                warn!(frame = frame_no, suppressed, error = %e, "telemetry report dropped");
            }
        }
    }
}
