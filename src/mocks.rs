use std::io::Cursor;
use std::path::Path;

use image::{imageops, imageops::FilterType, GrayImage, ImageFormat, Luma};

use crate::errors::{BridgeError, Result};
use crate::imageops_ai::alpha::AlphaMaskApplicable;
use crate::traits::{BackgroundRemover, Upscaler};
use crate::upscale::{open_image, ModelDescriptor};

/// Nearest-neighbour stand-in for RealESRGAN.
///
/// Like the real tool it drops alpha and always writes an RGB PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockUpscaler;

impl Upscaler for MockUpscaler {
    fn upscale(&self, input: &Path, output: &Path, model: &ModelDescriptor) -> Result<()> {
        let image = open_image(input, "open image")?.into_rgb8();
        let (width, height) = image.dimensions();
        let upscaled = imageops::resize(
            &image,
            width * model.scale,
            height * model.scale,
            FilterType::Nearest,
        );
        upscaled.save_with_format(output, ImageFormat::Png)?;
        Ok(())
    }
}

/// Treats every pixel matching the top-left colour as background.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBackgroundRemover;

impl BackgroundRemover for MockBackgroundRemover {
    fn remove_background(&self, input: &[u8]) -> Result<Vec<u8>> {
        let image = image::load_from_memory(input)?.into_rgb8();
        let background = *image.get_pixel(0, 0);
        let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if *image.get_pixel(x, y) == background {
                Luma([0])
            } else {
                Luma([255])
            }
        });

        let cutout = image.apply_alpha_mask(&mask)?;
        let mut bytes = Vec::new();
        cutout.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Background remover whose inference always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingBackgroundRemover;

impl BackgroundRemover for FailingBackgroundRemover {
    fn remove_background(&self, _input: &[u8]) -> Result<Vec<u8>> {
        Err(BridgeError::Model {
            operation: "mock inference".to_string(),
            source: "inference backend crashed".into(),
        })
    }
}

/// Writes an 8-bit paletted PNG whose `trns` entries give per-index alpha.
#[cfg(test)]
pub(crate) fn write_indexed_png(
    path: &Path,
    width: u32,
    height: u32,
    palette: &[[u8; 3]],
    trns: &[u8],
    indices: &[u8],
) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(palette.concat());
    encoder.set_trns(trns.to_vec());
    let mut writer = encoder.write_header().unwrap();
    writer.write_image_data(indices).unwrap();
}
