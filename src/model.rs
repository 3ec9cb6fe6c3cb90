use std::io::Cursor;
use std::path::Path;

use image::{imageops, imageops::FilterType, ImageBuffer, ImageFormat, Luma, RgbImage};
use ndarray::prelude::*;
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::debug;

use crate::errors::{BridgeError, Result};
use crate::imageops_ai::alpha::AlphaMaskApplicable;
use crate::traits::BackgroundRemover;

const DEFAULT_IMAGE_SIZE: u32 = 320;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// U²-Net salient object segmentation run through ONNX Runtime.
pub struct U2NetRemover {
    pub image_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

fn model_error(operation: impl Into<String>) -> impl FnOnce(ort::Error) -> BridgeError {
    let operation = operation.into();
    move |e| BridgeError::Model {
        operation,
        source: Box::new(e),
    }
}

fn execution_providers() -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    #[cfg(feature = "cuda")]
    providers.push(ort::execution_providers::CUDAExecutionProvider::default().build());
    providers.push(CPUExecutionProvider::default().build());
    providers
}

impl U2NetRemover {
    /// Loads the model from `model_path` only; nothing is fetched over the network.
    pub fn new(model_path: &Path) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(model_error("session builder initialization"))?
            .with_execution_providers(execution_providers())
            .map_err(model_error("execution provider setup"))?
            .with_memory_pattern(true)
            .map_err(model_error("memory pattern setup"))?
            .commit_from_file(model_path)
            .map_err(model_error(format!(
                "model file load: {}",
                model_path.display()
            )))?;

        let input = session.inputs.first().ok_or_else(|| BridgeError::Model {
            operation: "model input lookup".to_string(),
            source: "model declares no inputs".into(),
        })?;
        let output = session.outputs.first().ok_or_else(|| BridgeError::Model {
            operation: "model output lookup".to_string(),
            source: "model declares no outputs".into(),
        })?;

        // Dynamic spatial axes come back as -1.
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&side| side > 0)
            .map_or(DEFAULT_IMAGE_SIZE, |side| side as u32);
        debug!(image_size, input = %input.name, output = %output.name, "model loaded");

        Ok(Self {
            image_size,
            input_name: input.name.clone(),
            output_name: output.name.clone(),
            session: Mutex::new(session),
        })
    }

    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

impl BackgroundRemover for U2NetRemover {
    fn remove_background(&self, input: &[u8]) -> Result<Vec<u8>> {
        let image = image::load_from_memory(input)
            .map_err(|e| BridgeError::codec("decode input", "in-memory", e))?
            .into_rgb8();
        let (width, height) = image.dimensions();

        let tensor = preprocess(&image, self.image_size);
        let prediction = self.predict(tensor.view())?;
        let mask = postprocess_mask(prediction, self.image_size, width, height)?;

        let cutout = image.apply_alpha_mask(&mask)?;
        let mut bytes = Vec::new();
        cutout
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| BridgeError::codec("encode cutout", "in-memory", e))?;
        Ok(bytes)
    }
}

/// Resizes to the model's square input and normalizes to NCHW with ImageNet
/// statistics after scaling by the brightest channel value.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let resized = imageops::resize(image, image_size, image_size, FilterType::Lanczos3);
    let max = resized
        .as_raw()
        .iter()
        .copied()
        .max()
        .map_or(1e-6, |v| f32::from(v).max(1e-6));

    let side = image_size as usize;
    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let value = f32::from(resized.get_pixel(x as u32, y as u32)[c]) / max;
        (value - MEAN[c]) / STD[c]
    })
}

/// Min-max normalizes the first prediction map and scales it back to the
/// source dimensions.
pub fn postprocess_mask(
    prediction: Array4<f32>,
    image_size: u32,
    width: u32,
    height: u32,
) -> Result<ImageBuffer<Luma<f32>, Vec<f32>>> {
    let map = prediction.slice(s![0, 0, .., ..]);
    let (min, max) = map
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = (max - min).max(f32::EPSILON);

    let values = map
        .as_standard_layout()
        .iter()
        .map(|&v| (v - min) / range)
        .collect::<Vec<_>>();
    let mask = ImageBuffer::<Luma<f32>, _>::from_raw(image_size, image_size, values).ok_or_else(
        || BridgeError::Model {
            operation: "mask reshape".to_string(),
            source: format!("prediction is not {image_size}x{image_size}").into(),
        },
    )?;

    let mut mask = imageops::resize(&mask, width, height, FilterType::Lanczos3);
    for Luma([alpha]) in mask.pixels_mut() {
        *alpha = alpha.clamp(0.0, 1.0);
    }
    Ok(mask)
}
