//! `racer-runtime` – the control loop and everything around it.
//!
//! # Modules
//!
//! - [`drive_loop`] – [`DriveLoop`][drive_loop::DriveLoop]: acquires the rig,
//!   then runs sense → infer → act → record → report until stopped or until
//!   a debug session completes.  [`StopSignal`][drive_loop::StopSignal] is
//!   the cancellation token; [`ActuatorGuard`][drive_loop::ActuatorGuard]
//!   leaves the car neutral on every exit path.
//! - [`config`] – [`DriveConfig`][config::DriveConfig]: the immutable
//!   per-run configuration record.
//! - [`policy`] – proportional lane-offset steering at constant throttle.
//! - [`recorder`] – [`DebugRecorder`][recorder::DebugRecorder]: bounded debug
//!   session with periodic annotated captures.
//! - [`report`] – namespaced [`MetricGroup`][report::MetricGroup]s and the
//!   collision-rejecting [`aggregate`][report::aggregate].
//! - [`sink`] – [`TelemetrySink`][sink::TelemetrySink] and its in-memory,
//!   JSON-lines and forwarding implementations.
//! - [`watchdog`] – per-stage time budgets.
//! - [`ratelimit`] – rate-limited warnings for failures that repeat every
//!   frame.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: log
//!   subscriber and optional OTLP span export.

pub mod config;
pub mod drive_loop;
pub mod policy;
pub mod ratelimit;
pub mod recorder;
pub mod report;
pub mod sink;
pub mod telemetry;
pub mod watchdog;

pub use config::{DriveConfig, ModelSource};
pub use drive_loop::{ActuatorGuard, DriveLoop, LoopOutcome, RunSummary, StopSignal};
pub use policy::{ControlPolicy, policy};
pub use recorder::{DebugRecorder, RecorderState, RecorderStep};
pub use report::{MetricGroup, aggregate};
pub use sink::{ForwardingSink, JsonLinesSink, MemorySink, NullSink, TelemetrySink};
pub use telemetry::{TracerProviderGuard, init_tracing};
