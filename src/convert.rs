use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use image::codecs::{
    bmp::BmpEncoder,
    gif::GifEncoder,
    jpeg::JpegEncoder,
    png::{CompressionType, FilterType as PngFilterType, PngEncoder},
    webp::WebPEncoder,
};
use image::{DynamicImage, Frame, Rgb};
use tracing::debug;

use crate::errors::{BridgeError, Result};
use crate::imageops_ai::flatten::FlattenAlpha;
use crate::status::{Status, StatusWriter};
use crate::upscale::open_image;

pub const JPEG_QUALITY: u8 = 95;
/// NeuQuant sampling speed for GIF palettes (1 = best, 30 = fastest).
pub const GIF_QUANTIZER_SPEED: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    WebP,
    Bmp,
    Gif,
}

impl FromStr for OutputFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            "bmp" => Ok(Self::Bmp),
            "gif" => Ok(Self::Gif),
            _ => Err(BridgeError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl OutputFormat {
    pub const fn supports_transparency(self) -> bool {
        !matches!(self, Self::Jpeg | Self::Bmp)
    }
}

/// Full convert operation: decode `input`, fit its colour type to `format`
/// and encode it to `output`.
pub fn run<W: Write>(
    format: &str,
    input: &Path,
    output: &Path,
    status: &mut StatusWriter<W>,
) -> Result<()> {
    status.emit(Status::Processing)?;
    status.emit(Status::ConvertingImage)?;

    let target = OutputFormat::from_str(format)?;

    status.emit(Status::LoadingImage)?;
    let image = open_image(input, "open image")?;

    let image = if !target.supports_transparency() && image.color().has_alpha() {
        status.emit(Status::ConvertingColorSpace)?;
        flatten_onto_white(&image)
    } else {
        image
    };

    status.emit(Status::SavingAs(format.to_string()))?;
    save(&image, target, output)
}

/// Composites any transparency onto opaque white, yielding 8-bit RGB.
pub fn flatten_onto_white(image: &DynamicImage) -> DynamicImage {
    if image.color().has_alpha() {
        DynamicImage::ImageRgb8(image.to_rgba8().flatten_onto(Rgb([u8::MAX; 3])))
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

/// Color types the JPEG and BMP encoders accept once alpha is gone.
fn to_opaque_8bit(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
        other if other.color().has_alpha() => flatten_onto_white(other),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn to_8bit_rgb_or_rgba(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image.clone(),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// PNG takes 8- and 16-bit integer buffers; float buffers are narrowed to 16 bits.
fn to_png_compatible(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb16(image.to_rgb16()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba16(image.to_rgba16()),
        _ => image.clone(),
    }
}

pub fn save(image: &DynamicImage, format: OutputFormat, output: &Path) -> Result<()> {
    let file =
        File::create(output).map_err(|e| BridgeError::file_system("create output", output, e))?;
    let mut writer = BufWriter::new(file);
    let codec_error =
        |e: image::ImageError| BridgeError::codec("encode image", output.display().to_string(), e);

    debug!(?format, color = ?image.color(), "encoding");
    match format {
        OutputFormat::Png => to_png_compatible(image)
            .write_with_encoder(PngEncoder::new_with_quality(
                &mut writer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            ))
            .map_err(codec_error)?,
        OutputFormat::Jpeg => to_opaque_8bit(image)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))
            .map_err(codec_error)?,
        // image's WebP encoder has no lossy mode, so there is no quality to set.
        OutputFormat::WebP => to_8bit_rgb_or_rgba(image)
            .write_with_encoder(WebPEncoder::new_lossless(&mut writer))
            .map_err(codec_error)?,
        OutputFormat::Bmp => to_opaque_8bit(image)
            .write_with_encoder(BmpEncoder::new(&mut writer))
            .map_err(codec_error)?,
        OutputFormat::Gif => {
            // The encoder builds an adaptive palette per frame and writes
            // the trailer when dropped.
            let mut encoder = GifEncoder::new_with_speed(&mut writer, GIF_QUANTIZER_SPEED);
            encoder
                .encode_frame(Frame::new(image.to_rgba8()))
                .map_err(codec_error)?;
        }
    }

    writer
        .flush()
        .map_err(|e| BridgeError::file_system("flush output", output, e))
}
