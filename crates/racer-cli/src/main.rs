//! `racer` – drive the car around the track.
//!
//! 1. Merges `~/.racer/config.toml`, `RACER_*` environment variables and
//!    command-line flags into one [`DriveConfig`].
//! 2. Picks the lane model: the simulated centroid model with `--sim`, or
//!    the ONNX model resolved from the artifact cache / `--local-model`.
//! 3. Runs the drive loop until the debug session completes or **Ctrl-C**
//!    fires the stop signal; the car is left neutral either way.
//!
//! Telemetry reports go to `--telemetry <path>` as JSON lines, or to stdout
//! when no path is configured.  Status output goes to stderr.

mod config;
mod model;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::warn;

use racer_hal::sim::SimRig;
use racer_perception::sim::{SimDetector, SimLaneModel};
use racer_perception::{Detector, LaneModel};
use racer_runtime::{
    DriveConfig, DriveLoop, ForwardingSink, JsonLinesSink, LoopOutcome, RunSummary, StopSignal,
    TelemetrySink, init_tracing,
};
use racer_types::RacerError;

/// Per-frame stripe drift of the simulated camera, so `--sim` runs steer.
const SIM_DRIFT: f64 = 0.02;

#[derive(Parser, Debug)]
#[command(name = "racer", author, version, about = "Drive the car around the track")]
struct Args {
    /// Nominal frame rate in Hz.
    #[arg(long)]
    framerate: Option<u32>,
    /// Run a bounded debug session with annotated frame captures.
    #[arg(short, long)]
    debug: bool,
    /// Debug session length in seconds.
    #[arg(long)]
    debug_seconds: Option<u32>,
    /// Capture every N-th frame during a debug session.
    #[arg(long)]
    debug_freq: Option<u32>,
    /// Base throttle, 0 (stop) to 1 (full speed).
    #[arg(long)]
    throttle: Option<f64>,
    /// Overlay object detections on captured frames.
    #[arg(long)]
    detect: bool,
    /// Version of the cached lane model artifact.
    #[arg(short = 'v', long)]
    model_version: Option<String>,
    /// Use this model file instead of the artifact cache.
    #[arg(long, value_name = "PATH")]
    local_model: Option<PathBuf>,
    /// Write telemetry reports to this file as JSON lines.
    #[arg(long, value_name = "PATH")]
    telemetry: Option<PathBuf>,
    /// Settings file (default: ~/.racer/config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Use the simulated lane model and detector instead of a trained model.
    #[arg(long)]
    sim: bool,
    /// Persist the merged settings to the settings file before driving.
    #[arg(long)]
    save_config: bool,
}

impl Args {
    /// Flags override whatever the file and environment produced.
    fn apply(&self, cfg: &mut config::Config) {
        if let Some(v) = self.framerate {
            cfg.framerate = v;
        }
        if self.debug {
            cfg.debug = true;
        }
        if let Some(v) = self.debug_seconds {
            cfg.debug_seconds = v;
        }
        if let Some(v) = self.debug_freq {
            cfg.debug_freq = v;
        }
        if let Some(v) = self.throttle {
            cfg.throttle = v;
        }
        if self.detect {
            cfg.detect_objects = true;
        }
        if let Some(v) = &self.model_version {
            cfg.model_version = v.clone();
        }
        if let Some(v) = &self.local_model {
            cfg.model_path = Some(v.clone());
        }
        if let Some(v) = &self.telemetry {
            cfg.telemetry_path = Some(v.clone());
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let settings_path = args.config.clone().unwrap_or_else(config::config_path);
    let mut settings = match config::load(&settings_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut settings);

    if args.save_config {
        match config::save_to(&settings, &settings_path) {
            Ok(()) => eprintln!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                settings_path.display().to_string().bold()
            ),
            Err(e) => eprintln!("{}: {}", "Error saving config".red(), e),
        }
    }

    let cfg = settings.to_drive_config();
    let _tracing = init_tracing("racer", cfg.debug);

    print_banner(&cfg, args.sim);

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping the car …".yellow().bold());
        handler_stop.trigger();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop can only end on its own");
    }

    match drive(cfg, settings.telemetry_path.as_deref(), args.sim, &stop) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("  {} {}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn drive(
    cfg: DriveConfig,
    telemetry_path: Option<&Path>,
    sim: bool,
    stop: &StopSignal,
) -> Result<RunSummary, RacerError> {
    let (lane_model, detector) = engines(&cfg, sim)?;
    let sink = open_sink(telemetry_path)?;
    let rig = SimRig::new(cfg.resolution).with_drift(SIM_DRIFT).into_builder();
    DriveLoop::init(cfg, rig, lane_model, detector, sink)?.run(stop)
}

fn engines(cfg: &DriveConfig, sim: bool) -> Result<(Box<dyn LaneModel>, Detector), RacerError> {
    if sim {
        let detector = if cfg.detect_objects {
            Detector::present(Box::new(SimDetector::demo(cfg.resolution)), cfg.thresholds())
        } else {
            Detector::None
        };
        return Ok((Box::new(SimLaneModel::new()), detector));
    }
    // No trained object detector ships yet; `--detect` without `--sim` fails
    // at init with a FatalInit naming the detector.
    let path = model::resolve(&cfg.model, &config::home_dir())?;
    Ok((load_lane_model(&path, cfg.resolution)?, Detector::None))
}

#[cfg(feature = "backend-tract")]
fn load_lane_model(path: &Path, resolution: u32) -> Result<Box<dyn LaneModel>, RacerError> {
    use racer_perception::onnx::OnnxLaneModel;
    use racer_perception::preprocess::Normalization;

    let model = OnnxLaneModel::load(path, resolution)?.with_normalization(Normalization::ImageNet);
    Ok(Box::new(model))
}

#[cfg(not(feature = "backend-tract"))]
fn load_lane_model(path: &Path, _resolution: u32) -> Result<Box<dyn LaneModel>, RacerError> {
    Err(RacerError::init(
        "lane_model",
        format!(
            "cannot load {}: built without the `backend-tract` feature (use --sim, or rebuild with --features backend-tract)",
            path.display()
        ),
    ))
}

/// JSON lines behind a writer thread, so file I/O stays off the control
/// path.
fn open_sink(path: Option<&Path>) -> Result<Box<dyn TelemetrySink>, RacerError> {
    let inner: Box<dyn TelemetrySink> = match path {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                RacerError::init("telemetry", format!("cannot create {}: {e}", path.display()))
            })?;
            Box::new(JsonLinesSink::new(BufWriter::new(file)))
        }
        None => Box::new(JsonLinesSink::new(std::io::stdout())),
    };
    Ok(Box::new(ForwardingSink::spawn(inner)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Status output
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(cfg: &DriveConfig, sim: bool) {
    let model = if sim { "sim".to_string() } else { cfg.model.to_string() };
    eprintln!();
    eprintln!("  {} {}", "racer".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    eprintln!(
        "  {} {}  {} {} Hz  {} {}",
        "model".dimmed(),
        model.bold(),
        "rate".dimmed(),
        cfg.framerate,
        "throttle".dimmed(),
        cfg.throttle,
    );
    if cfg.debug {
        eprintln!(
            "  {} {} frames, capture every {}",
            "debug session:".yellow(),
            cfg.debug_frame_budget(),
            cfg.debug_freq
        );
    }
    eprintln!("  Press {} to stop.", "Ctrl-C".bold());
    eprintln!();
}

fn print_summary(summary: &RunSummary) {
    let outcome = match summary.outcome {
        LoopOutcome::Stopped => "stopped by operator".yellow(),
        LoopOutcome::DebugDone => "debug session complete".green(),
    };
    eprintln!();
    eprintln!("  {} {}", "✓".green().bold(), outcome);
    eprintln!(
        "  {} iterations, {} captures, {} stage overruns  (run {})",
        summary.iterations,
        summary.captures,
        summary.overruns,
        summary.run_id.to_string().dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let args = Args::try_parse_from([
            "racer",
            "--framerate",
            "20",
            "-d",
            "--debug-freq",
            "4",
            "--detect",
            "-v",
            "v2",
        ])
        .unwrap();
        let mut cfg = config::Config::default();
        args.apply(&mut cfg);
        assert_eq!(cfg.framerate, 20);
        assert!(cfg.debug);
        assert_eq!(cfg.debug_freq, 4);
        assert!(cfg.detect_objects);
        assert_eq!(cfg.model_version, "v2");
        assert_eq!(cfg.debug_seconds, 120);
    }

    #[test]
    fn absent_flags_leave_settings_alone() {
        let args = Args::try_parse_from(["racer"]).unwrap();
        let mut cfg = config::Config::default();
        cfg.debug = true;
        cfg.throttle = 0.3;
        args.apply(&mut cfg);
        assert!(cfg.debug);
        assert_eq!(cfg.throttle, 0.3);
    }

    #[test]
    fn sim_engines_honour_detection_flag() {
        let cfg = DriveConfig {
            detect_objects: true,
            ..DriveConfig::default()
        };
        let (_, detector) = engines(&cfg, true).unwrap();
        assert!(detector.is_present());
        let (_, detector) = engines(&DriveConfig::default(), true).unwrap();
        assert!(!detector.is_present());
    }

    #[test]
    fn sim_run_writes_telemetry_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("run.jsonl");
        let cfg = DriveConfig {
            debug: true,
            framerate: 5,
            debug_seconds: 1,
            debug_freq: 5,
            resolution: 64,
            ..DriveConfig::default()
        };
        let summary = drive(cfg, Some(&path), true, &StopSignal::new()).unwrap();
        assert_eq!(summary.outcome, LoopOutcome::DebugDone);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 5);
        assert!(written.lines().last().unwrap().contains("inference/frame"));
    }
}
