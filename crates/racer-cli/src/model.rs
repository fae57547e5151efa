//! Lane model lookup.
//!
//! Versioned models live in a local artifact cache populated by an external
//! tool:
//!
//! ```text
//! ~/.racer/artifacts/<name>/<version>/<name>.onnx
//! ```
//!
//! Nothing is downloaded here; a missing artifact is a start-up failure.

use std::path::{Path, PathBuf};

use racer_runtime::ModelSource;
use racer_types::RacerError;

/// Cache location of artifact `name` at `version` under `home`.
pub fn artifact_path(home: &Path, name: &str, version: &str) -> PathBuf {
    home.join(".racer")
        .join("artifacts")
        .join(name)
        .join(version)
        .join(format!("{name}.onnx"))
}

/// Resolve `source` to a model file that exists on disk.
///
/// # Errors
///
/// Returns [`RacerError::FatalInit`] when the file is not there.
pub fn resolve(source: &ModelSource, home: &Path) -> Result<PathBuf, RacerError> {
    let path = match source {
        ModelSource::Local(path) => path.clone(),
        ModelSource::Remote { name, version } => artifact_path(home, name, version),
    };
    if path.is_file() {
        Ok(path)
    } else {
        Err(RacerError::init(
            "lane_model",
            format!("model {source} not found at {}", path.display()),
        ))
    }
}
