//! Frame → model input tensor.
//!
//! Models take a `1×3×H×W` `f32` tensor in channel-major (CHW) order with
//! values scaled to `[0, 1]`.  ImageNet mean/std normalisation is available
//! for backbones trained with it.

use racer_types::{Frame, RacerError};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalisation applied after scaling to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// Plain `value / 255`.
    #[default]
    UnitRange,
    /// `(value / 255 - mean) / std` with ImageNet statistics.
    ImageNet,
}

/// Convert an RGB24 frame into a flat CHW tensor of `3 * width * height`
/// values.
///
/// # Errors
///
/// Returns [`RacerError::InferenceFailure`] when the frame buffer does not
/// match its declared dimensions.
pub fn to_tensor(frame: &Frame, norm: Normalization) -> Result<Vec<f32>, RacerError> {
    if !frame.is_well_formed() {
        return Err(RacerError::InferenceFailure(format!(
            "frame {}x{} carries {} bytes, expected {}",
            frame.width,
            frame.height,
            frame.data.len(),
            frame.width as usize * frame.height as usize * 3
        )));
    }

    let plane = frame.width as usize * frame.height as usize;
    let mut tensor = vec![0.0f32; plane * 3];
    for (i, px) in frame.data.chunks_exact(3).enumerate() {
        for c in 0..3 {
            let v = f32::from(px[c]) / 255.0;
            tensor[c * plane + i] = match norm {
                Normalization::UnitRange => v,
                Normalization::ImageNet => (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c],
            };
        }
    }
    Ok(tensor)
}
