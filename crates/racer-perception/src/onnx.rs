#![cfg(feature = "backend-tract")]

//! ONNX lane regression model executed with `tract-onnx`.
//!
//! The model takes a `1×3×R×R` `f32` input and produces at least two
//! outputs, read as `(x, y)`.  Weights are loaded once, from a path resolved
//! by the caller.

use std::path::Path;

use racer_types::{Frame, LaneEstimate, RacerError};
use tract_onnx::prelude::*;
use tracing::info;

use crate::engine::{LaneModel, checked_estimate};
use crate::preprocess::{Normalization, to_tensor};

pub struct OnnxLaneModel {
    model: TypedRunnableModel<TypedModel>,
    resolution: u32,
    norm: Normalization,
}

impl OnnxLaneModel {
    /// Load and optimise the model at `model_path` for `resolution`-square
    /// frames.
    ///
    /// # Errors
    ///
    /// Returns [`RacerError::FatalInit`] if the file cannot be read or the
    /// graph cannot be specialised to the input shape.
    pub fn load<P: AsRef<Path>>(model_path: P, resolution: u32) -> Result<Self, RacerError> {
        let model_path = model_path.as_ref();
        let side = resolution as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| {
                m.with_input_fact(0, f32::fact([1, 3, side, side]).into())
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| {
                RacerError::init(
                    "lane_model",
                    format!("failed to load ONNX model from {}: {e:#}", model_path.display()),
                )
            })?;
        info!(path = %model_path.display(), resolution, "ONNX lane model loaded");
        Ok(Self {
            model,
            resolution,
            norm: Normalization::UnitRange,
        })
    }

    /// Select the input normalisation the model was trained with.
    pub fn with_normalization(mut self, norm: Normalization) -> Self {
        self.norm = norm;
        self
    }
}

impl LaneModel for OnnxLaneModel {
    fn name(&self) -> &str {
        "onnx"
    }

    fn infer(&mut self, frame: &Frame) -> Result<LaneEstimate, RacerError> {
        if frame.width != self.resolution || frame.height != self.resolution {
            return Err(RacerError::InferenceFailure(format!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width, frame.height, self.resolution, self.resolution
            )));
        }
        let side = self.resolution as usize;
        let data = to_tensor(frame, self.norm)?;
        let input: Tensor = tract_ndarray::Array4::from_shape_vec((1, 3, side, side), data)
            .map_err(|e| RacerError::InferenceFailure(format!("input shape: {e}")))?
            .into();
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| RacerError::InferenceFailure(format!("ONNX inference failed: {e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| RacerError::InferenceFailure("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| RacerError::InferenceFailure(format!("output tensor was not f32: {e}")))?;
        let mut values = view.iter().copied();
        match (values.next(), values.next()) {
            (Some(x), Some(y)) => checked_estimate(f64::from(x), f64::from(y)),
            _ => Err(RacerError::InferenceFailure(
                "model output has fewer than two values".to_string(),
            )),
        }
    }
}
