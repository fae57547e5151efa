//! Settings file – reads/writes `~/.racer/config.toml`.
//!
//! Every field is optional in the file; missing ones fall back to the same
//! defaults as [`DriveConfig`].  Precedence, lowest first: defaults, file,
//! `RACER_*` environment, command-line flags.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use racer_runtime::{DriveConfig, ModelSource};

/// Persisted user configuration stored in `~/.racer/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub framerate: u32,
    pub throttle: f64,
    pub throttle_gain: f64,
    pub steering_gain: f64,

    pub debug: bool,
    pub debug_seconds: u32,
    pub debug_freq: u32,

    /// Overlay object detections on captured frames.
    pub detect_objects: bool,
    pub resolution: u32,
    pub marker_radius: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,

    /// Artifact name in the local model cache.
    pub model_name: String,
    /// Artifact version, e.g. `"latest"` or `"v3"`.
    pub model_version: String,
    /// Local model file.  Takes precedence over the cached artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Where telemetry reports are written as JSON lines.  Stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let drive = DriveConfig::default();
        let (model_name, model_version) = match drive.model {
            ModelSource::Remote { name, version } => (name, version),
            ModelSource::Local(_) => ("trt-model".to_string(), "latest".to_string()),
        };
        Self {
            framerate: drive.framerate,
            throttle: drive.throttle,
            throttle_gain: drive.throttle_gain,
            steering_gain: drive.steering_gain,
            debug: drive.debug,
            debug_seconds: drive.debug_seconds,
            debug_freq: drive.debug_freq,
            detect_objects: drive.detect_objects,
            resolution: drive.resolution,
            marker_radius: drive.marker_radius,
            confidence_threshold: drive.confidence_threshold,
            iou_threshold: drive.iou_threshold,
            model_name,
            model_version,
            model_path: None,
            telemetry_path: None,
        }
    }
}

impl Config {
    /// The record handed to the drive loop.
    pub fn to_drive_config(&self) -> DriveConfig {
        let model = match &self.model_path {
            Some(path) => ModelSource::Local(path.clone()),
            None => ModelSource::Remote {
                name: self.model_name.clone(),
                version: self.model_version.clone(),
            },
        };
        DriveConfig {
            framerate: self.framerate,
            throttle: self.throttle,
            throttle_gain: self.throttle_gain,
            steering_gain: self.steering_gain,
            debug: self.debug,
            debug_seconds: self.debug_seconds,
            debug_freq: self.debug_freq,
            detect_objects: self.detect_objects,
            resolution: self.resolution,
            marker_radius: self.marker_radius,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            model,
        }
    }
}

/// `$HOME`, falling back to `%USERPROFILE%`, then the working directory.
pub fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.racer/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".racer").join("config.toml")
}

/// Read the config file at `path`.  Returns `None` if it does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// The file at `path` (or defaults when absent) with environment overrides
/// applied.
pub fn load(path: &Path) -> Result<Config, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `RACER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RACER_FRAMERATE` | `framerate` |
/// | `RACER_THROTTLE` | `throttle` |
/// | `RACER_DEBUG` | `debug` (`1`/`true`/`0`/`false`) |
/// | `RACER_MODEL_PATH` | `model_path` |
/// | `RACER_MODEL_VERSION` | `model_version` |
/// | `RACER_TELEMETRY_PATH` | `telemetry_path` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RACER_FRAMERATE")
        && let Ok(rate) = v.parse::<u32>() {
            cfg.framerate = rate;
        }
    if let Ok(v) = std::env::var("RACER_THROTTLE")
        && let Ok(throttle) = v.parse::<f64>() {
            cfg.throttle = throttle;
        }
    if let Ok(v) = std::env::var("RACER_DEBUG")
        && let Some(flag) = parse_flag(&v) {
            cfg.debug = flag;
        }
    if let Ok(v) = std::env::var("RACER_MODEL_PATH") {
        cfg.model_path = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("RACER_MODEL_VERSION") {
        cfg.model_version = v;
    }
    if let Ok(v) = std::env::var("RACER_TELEMETRY_PATH") {
        cfg.telemetry_path = Some(PathBuf::from(v));
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // rwx------
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // rw-------
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
